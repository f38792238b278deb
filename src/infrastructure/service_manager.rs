//! 服务管理器
//!
//! 把字符串别名解析为惰性构建的服务实例：
//! - 别名 → 工厂名称的映射在启动时一次性配置
//! - 实例按 (别名, 有效配置哈希) 缓存，同一别名在不同配置下得到不同实例
//! - 使用 OnceCell 保证同一缓存键同一时刻最多只有一次构建
//! - 失败从不缓存，`reset` / `get_fresh` 显式失效

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

use super::container::FactoryContainer;
use super::factory::{Factory, Instance};
use crate::config::{Config, ConfigView, DimensionPath};
use crate::errors::{ConfigError, ManagerError, ManagerResult};

/// 不支持配置的工厂使用的固定缓存键
pub const UNCONFIGURED_KEY: &str = "unconfigured";

/// 配置源中工厂映射所在的顶层键
pub const FACTORIES_KEY: &str = "factories";

/// 配置源中维度映射所在的顶层键
pub const CONFIG_DIMENSIONS_KEY: &str = "configDimensions";

type Slot = Arc<OnceCell<Instance>>;

/// 别名映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Registry {
    factories: BTreeMap<String, String>,
    dimensions: BTreeMap<String, DimensionPath>,
}

impl Registry {
    /// 把配置源中的映射合并进来，同名别名以配置源为准
    fn merged_with(&self, source: &Config) -> Result<Self, ConfigError> {
        let mut merged = self.clone();
        if let Some(factories) = source.get_as::<BTreeMap<String, String>>(FACTORIES_KEY)? {
            merged.factories.extend(factories);
        }
        if let Some(dimensions) =
            source.get_as::<BTreeMap<String, DimensionPath>>(CONFIG_DIMENSIONS_KEY)?
        {
            merged.dimensions.extend(dimensions);
        }
        Ok(merged)
    }
}

/// 有效配置：缓存键，以及构建前要交给工厂的配置
struct EffectiveConfig {
    key: String,
    apply: Option<ConfigView>,
}

/// 内部统计信息（原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    builds: AtomicUsize,
    resets: AtomicUsize,
}

struct ManagerInner {
    container: FactoryContainer,
    config: Config,
    defaults: Registry,
    registry: OnceLock<Registry>,
    /// 别名 → (配置哈希 → 实例)
    cache: DashMap<String, HashMap<String, Slot>>,
    /// 工厂名称 → 构建锁，同一工厂对象的 配置+调用 不能交错
    build_locks: DashMap<String, Arc<Mutex<()>>>,
    stats: InnerStats,
}

/// 服务管理器 - 克隆后共享同一份映射和缓存
#[derive(Clone)]
pub struct ServiceManager {
    inner: Arc<ManagerInner>,
}

impl ServiceManager {
    /// 创建未配置的服务管理器
    pub fn new(container: FactoryContainer, config: Config) -> Self {
        Self::builder(container, config).build()
    }

    /// 带默认映射的构建器
    pub fn builder(container: FactoryContainer, config: Config) -> ServiceManagerBuilder {
        ServiceManagerBuilder {
            container,
            config,
            defaults: Registry::default(),
        }
    }

    /// 从配置源合并 `factories` 和 `configDimensions`
    ///
    /// 只有第一次调用生效，之后的调用是空操作。返回本次调用是否生效。
    pub fn configure(&self, source: &Config) -> ManagerResult<bool> {
        if self.inner.registry.get().is_some() {
            tracing::debug!("Service manager already configured, ignoring configure call");
            return Ok(false);
        }

        let merged = self.inner.defaults.merged_with(source)?;
        let aliases = merged.factories.len();
        let applied = self.inner.registry.set(merged).is_ok();
        if applied {
            tracing::info!(aliases, "Service manager configured");
        }
        Ok(applied)
    }

    pub fn is_configured(&self) -> bool {
        self.inner.registry.get().is_some()
    }

    fn registry(&self) -> &Registry {
        self.inner.registry.get().unwrap_or(&self.inner.defaults)
    }

    /// 别名已映射且底层容器当前能解析其工厂
    pub fn has(&self, alias: &str) -> bool {
        self.factory_name(alias)
            .is_some_and(|name| self.inner.container.has(name))
    }

    /// 解析别名，必要时构建并缓存
    ///
    /// 工厂在当前 worker 线程上同步执行；构建耗时较长时请在 `spawn_blocking` 中调用。
    pub async fn get(&self, alias: &str) -> ManagerResult<Instance> {
        self.resolve(alias).await.map(|(instance, _)| instance)
    }

    /// 返回实例以及构建它的工厂类型名
    async fn resolve(&self, alias: &str) -> ManagerResult<(Instance, &'static str)> {
        let stats = &self.inner.stats;
        stats.total_resolutions.fetch_add(1, Ordering::Relaxed);

        let (factory_name, factory) = self.resolve_factory(alias)?;
        let type_name = factory.type_name();
        let effective = self.effective_config(alias, factory.as_ref())?;
        let key = effective.key.clone();
        let slot = self.slot(alias, &key);

        if let Some(instance) = slot.get() {
            stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok((instance.clone(), type_name));
        }

        stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        let built = slot
            .get_or_try_init(|| async move {
                self.build(alias, &factory_name, factory.as_ref(), effective)
            })
            .await
            .cloned();
        match built {
            Ok(instance) => Ok((instance, type_name)),
            Err(e) => {
                self.discard_failed_slot(alias, &key, &slot);
                Err(e)
            }
        }
    }

    /// 丢弃别名的缓存后重新构建
    pub async fn get_fresh(&self, alias: &str) -> ManagerResult<Instance> {
        self.reset(alias);
        self.get(alias).await
    }

    /// 清除别名在所有配置哈希下的缓存实例，映射保持不变
    pub fn reset(&self, alias: &str) {
        if let Some((_, entries)) = self.inner.cache.remove(alias) {
            self.inner.stats.resets.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(alias, entries = entries.len(), "Reset cached service instances");
        }
    }

    /// 解析并转换为具体类型
    pub async fn get_as<T: Send + Sync + 'static>(&self, alias: &str) -> ManagerResult<Arc<T>> {
        let (instance, type_name) = self.resolve(alias).await?;
        downcast(alias, instance, type_name)
    }

    pub async fn get_fresh_as<T: Send + Sync + 'static>(
        &self,
        alias: &str,
    ) -> ManagerResult<Arc<T>> {
        self.reset(alias);
        let (instance, type_name) = self.resolve(alias).await?;
        downcast(alias, instance, type_name)
    }

    /// 返回缓存实例；若 `is_valid` 判定其已不可用（例如底层连接已关闭），
    /// 则透明地重新构建。
    pub async fn get_valid<T, F>(&self, alias: &str, is_valid: F) -> ManagerResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        let current = self.get_as::<T>(alias).await?;
        if is_valid(&current) {
            return Ok(current);
        }

        tracing::info!(alias, "Cached service instance is no longer usable, rebuilding");
        self.get_fresh_as::<T>(alias).await
    }

    /// 已配置的别名（排序后）
    pub fn aliases(&self) -> Vec<String> {
        self.registry().factories.keys().cloned().collect()
    }

    /// 别名映射到的工厂名称
    pub fn factory_name(&self, alias: &str) -> Option<&str> {
        self.registry().factories.get(alias).map(String::as_str)
    }

    /// 别名的配置维度路径
    pub fn dimension(&self, alias: &str) -> Option<&DimensionPath> {
        self.registry().dimensions.get(alias)
    }

    /// 别名当前的缓存键，不会触发构建
    pub fn config_hash(&self, alias: &str) -> ManagerResult<String> {
        let (_, factory) = self.resolve_factory(alias)?;
        Ok(self.effective_config(alias, factory.as_ref())?.key)
    }

    /// 别名已构建完成的缓存实例数
    pub fn cached_count(&self, alias: &str) -> usize {
        self.inner
            .cache
            .get(alias)
            .map(|entries| entries.values().filter(|slot| slot.initialized()).count())
            .unwrap_or(0)
    }

    pub fn container(&self) -> &FactoryContainer {
        &self.inner.container
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// 获取统计信息
    pub fn stats(&self) -> ManagerStats {
        let stats = &self.inner.stats;
        ManagerStats {
            total_resolutions: stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            builds: stats.builds.load(Ordering::Relaxed),
            resets: stats.resets.load(Ordering::Relaxed),
        }
    }

    fn resolve_factory(&self, alias: &str) -> ManagerResult<(String, Arc<dyn Factory>)> {
        let Some(name) = self.factory_name(alias) else {
            tracing::debug!(alias, "Alias has no factory mapping");
            return Err(ManagerError::not_found(alias));
        };

        // 容器可能在 has 与 get 之间撤销注册，两种情况都视为未找到
        match self.inner.container.get(name) {
            Ok(factory) => Ok((name.to_string(), factory)),
            Err(e) => {
                tracing::debug!(alias, error = %e, "Factory for alias is not resolvable");
                Err(ManagerError::not_found(alias))
            }
        }
    }

    fn effective_config(&self, alias: &str, factory: &dyn Factory) -> ManagerResult<EffectiveConfig> {
        if factory.as_configurable().is_none() {
            return Ok(EffectiveConfig {
                key: UNCONFIGURED_KEY.to_string(),
                apply: None,
            });
        }

        match self.dimension(alias) {
            Some(path) => {
                let view = self.inner.config.from_dimension(path)?;
                Ok(EffectiveConfig {
                    key: view.hash(),
                    apply: Some(view),
                })
            }
            None => Ok(EffectiveConfig {
                key: ConfigView::empty().hash(),
                apply: None,
            }),
        }
    }

    fn slot(&self, alias: &str, key: &str) -> Slot {
        if let Some(entries) = self.inner.cache.get(alias) {
            if let Some(slot) = entries.get(key) {
                return slot.clone();
            }
        }

        self.inner
            .cache
            .entry(alias.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// 构建失败后移除未初始化的槽，避免失败的配置哈希在缓存中堆积
    ///
    /// 仍有其他调用方持有该槽时保留它，由它们继续尝试初始化。
    fn discard_failed_slot(&self, alias: &str, key: &str, slot: &Slot) {
        if let Some(mut entries) = self.inner.cache.get_mut(alias) {
            let unused = entries.get(key).is_some_and(|current| {
                Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(slot) == 2
            });
            if unused {
                entries.remove(key);
            }
        }
        self.inner
            .cache
            .remove_if(alias, |_, entries| entries.is_empty());
    }

    fn build(
        &self,
        alias: &str,
        factory_name: &str,
        factory: &dyn Factory,
        effective: EffectiveConfig,
    ) -> ManagerResult<Instance> {
        let lock = self
            .inner
            .build_locks
            .entry(factory_name.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock();

        if let Some(aware) = factory.as_container_aware() {
            aware.set_container(self.inner.container.handle());
        }
        if let (Some(configurable), Some(view)) = (factory.as_configurable(), effective.apply) {
            configurable.configure(view);
        }

        let instance = factory.invoke().map_err(|e| {
            tracing::warn!(alias, factory = factory_name, error = %e, "Service construction failed");
            ManagerError::Construction(e)
        })?;

        self.inner.stats.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            alias,
            factory = factory_name,
            type_name = factory.type_name(),
            config_hash = %effective.key,
            "Built service instance"
        );
        Ok(instance)
    }
}

fn downcast<T: Send + Sync + 'static>(
    alias: &str,
    instance: Instance,
    factory_type: &'static str,
) -> ManagerResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| ManagerError::TypeMismatch {
            alias: alias.to_string(),
            expected: std::any::type_name::<T>(),
            actual: factory_type,
        })
}

/// 服务管理器构建器 - 预置默认映射，之后由 `configure` 合并覆盖
pub struct ServiceManagerBuilder {
    container: FactoryContainer,
    config: Config,
    defaults: Registry,
}

impl ServiceManagerBuilder {
    /// 默认的 别名 → 工厂名称 映射
    pub fn factory(mut self, alias: impl Into<String>, factory_name: impl Into<String>) -> Self {
        self.defaults
            .factories
            .insert(alias.into(), factory_name.into());
        self
    }

    /// 默认的 别名 → 维度路径 映射
    pub fn dimension(mut self, alias: impl Into<String>, path: DimensionPath) -> Self {
        self.defaults.dimensions.insert(alias.into(), path);
        self
    }

    pub fn build(self) -> ServiceManager {
        ServiceManager {
            inner: Arc::new(ManagerInner {
                container: self.container,
                config: self.config,
                defaults: self.defaults,
                registry: OnceLock::new(),
                cache: DashMap::new(),
                build_locks: DashMap::new(),
                stats: InnerStats::default(),
            }),
        }
    }
}

/// 服务管理器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub total_resolutions: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub builds: usize,
    pub resets: usize,
}

impl ManagerStats {
    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_resolutions as f64
        }
    }
}
