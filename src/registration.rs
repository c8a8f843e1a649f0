//! Registration helpers for connections and sessions
//!
//! A small service registry: services are keyed by type,
//! built by factories, cached according to a [`Lifetime`], and resolved as
//! `Arc<S>` (where `S` may be a trait object). Sessions do not depend on any of
//! it; it only wires connection strings and session types together.
//!
//! # Example
//!
//! ```ignore
//! let mut services = ServiceCollection::new();
//! register_connection::<SqliteConnection>(
//!    &mut services,
//!    "sqlite://app.db?mode=rwc",
//!    ConnectionRegistration::default(),
//! )?;
//! register_session::<dyn UserStore, SqliteUserStore>(
//!    &mut services,
//!    SessionRegistration::default(),
//! );
//!
//! let provider = services.build();
//! let scope = provider.create_scope();
//! let users = scope.resolve::<dyn UserStore>()?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::connection::FromConnectionString;
use crate::error::{Error, Result};

type Instance = Arc<dyn Any + Send + Sync>;
type Cache = Mutex<HashMap<TypeId, Instance>>;
type BuildFn = dyn Fn(&Scope) -> Result<Instance> + Send + Sync;

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
   /// A new instance for every resolution.
   #[default]
   Transient,
   /// One instance per [`Scope`].
   Scoped,
   /// One instance per [`ServiceProvider`].
   Singleton,
}

impl fmt::Display for Lifetime {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Lifetime::Transient => "transient",
         Lifetime::Scoped => "scoped",
         Lifetime::Singleton => "singleton",
      })
   }
}

impl FromStr for Lifetime {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      match s.trim().to_ascii_lowercase().as_str() {
         "transient" => Ok(Lifetime::Transient),
         "scoped" => Ok(Lifetime::Scoped),
         "singleton" => Ok(Lifetime::Singleton),
         other => Err(Error::InvalidArgument(format!("unknown lifetime: {other}"))),
      }
   }
}

/// Collection-wide defaults, passed explicitly instead of read from globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationDefaults {
   /// Whether [`register_session`] also registers a [`Factory`] when the
   /// call leaves [`SessionRegistration::register_factory`] unset.
   ///
   /// Default: false
   pub register_session_factories: bool,
}

/// Options for [`register_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionRegistration {
   /// Default: [`Lifetime::Transient`]
   pub lifetime: Lifetime,

   /// Also register a [`Factory`] for the connection type.
   ///
   /// Default: false
   pub register_factory: bool,
}

/// Options for [`register_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRegistration {
   /// Default: [`Lifetime::Transient`]
   pub lifetime: Lifetime,

   /// Also register a [`Factory`] for the abstraction. `None` defers to
   /// [`RegistrationDefaults::register_session_factories`].
   ///
   /// Default: None
   pub register_factory: Option<bool>,
}

/// A service that can build itself from resolved dependencies.
pub trait Injectable: Sized + Send + Sync + 'static {
   fn inject(scope: &Scope) -> Result<Self>;
}

/// Conversion from an implementation to the abstraction it is registered as.
///
/// Implement it for trait objects:
///
/// ```ignore
/// impl Provides<dyn UserStore> for SqliteUserStore {
///    fn provide(self: Arc<Self>) -> Arc<dyn UserStore> {
///       self
///    }
/// }
/// ```
pub trait Provides<A: ?Sized> {
   fn provide(self: Arc<Self>) -> Arc<A>;
}

impl<T: Send + Sync + 'static> Provides<T> for T {
   fn provide(self: Arc<Self>) -> Arc<T> {
      self
   }
}

/// Zero-argument factory for `S`, resolvable as a dependency.
///
/// Each call to [`Factory::create`] resolves `S` from the scope the factory was
/// resolved from, honoring the lifetime `S` is registered with.
///
/// The factory does not keep that scope alive. A service cached in a scope may
/// hold a factory without keeping the scope, and the sessions in it, from
/// being dropped; `create` then fails with [`Error::ScopeDisposed`].
pub struct Factory<S: ?Sized> {
   registry: Weak<Registry>,
   scoped: Weak<Cache>,
   _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> Factory<S> {
   fn new(scope: &Scope) -> Self {
      Self {
         registry: Arc::downgrade(&scope.registry),
         scoped: Arc::downgrade(&scope.scoped),
         _service: PhantomData,
      }
   }

   pub fn create(&self) -> Result<Arc<S>> {
      let (Some(registry), Some(scoped)) = (self.registry.upgrade(), self.scoped.upgrade())
      else {
         return Err(Error::ScopeDisposed(type_name::<S>()));
      };
      Scope { registry, scoped }.resolve::<S>()
   }
}

struct Registration {
   lifetime: Lifetime,
   name: &'static str,
   build: Box<BuildFn>,
}

/// Mutable set of registrations; turned into a [`ServiceProvider`] by
/// [`ServiceCollection::build`].
#[derive(Default)]
pub struct ServiceCollection {
   registrations: HashMap<TypeId, Registration>,
   defaults: RegistrationDefaults,
}

impl ServiceCollection {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_defaults(defaults: RegistrationDefaults) -> Self {
      Self {
         registrations: HashMap::new(),
         defaults,
      }
   }

   pub fn defaults(&self) -> RegistrationDefaults {
      self.defaults
   }

   /// Register `S` built by `factory` under `lifetime`.
   ///
   /// A later registration for the same `S` replaces the earlier one.
   pub fn add<S, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
   where
      S: ?Sized + Send + Sync + 'static,
      F: Fn(&Scope) -> Result<Arc<S>> + Send + Sync + 'static,
   {
      let name = type_name::<S>();
      let build = move |scope: &Scope| -> Result<Instance> {
         let service: Arc<S> = factory(scope)?;
         let instance: Instance = Arc::new(service);
         Ok(instance)
      };

      let previous = self.registrations.insert(
         TypeId::of::<S>(),
         Registration {
            lifetime,
            name,
            build: Box::new(build),
         },
      );

      if previous.is_some() {
         debug!(service = name, %lifetime, "Replaced service registration");
      } else {
         trace!(service = name, %lifetime, "Registered service");
      }
      self
   }

   /// Register a transient [`Factory<S>`].
   pub fn add_factory<S>(&mut self) -> &mut Self
   where
      S: ?Sized + Send + Sync + 'static,
   {
      self.add::<Factory<S>, _>(Lifetime::Transient, |scope| {
         Ok(Arc::new(Factory::new(scope)))
      })
   }

   pub fn contains<S: ?Sized + 'static>(&self) -> bool {
      self.registrations.contains_key(&TypeId::of::<S>())
   }

   pub fn lifetime_of<S: ?Sized + 'static>(&self) -> Option<Lifetime> {
      self
         .registrations
         .get(&TypeId::of::<S>())
         .map(|registration| registration.lifetime)
   }

   pub fn len(&self) -> usize {
      self.registrations.len()
   }

   pub fn is_empty(&self) -> bool {
      self.registrations.is_empty()
   }

   pub fn build(self) -> ServiceProvider {
      let registry = Arc::new(Registry {
         registrations: self.registrations,
         singletons: Mutex::new(HashMap::new()),
         root_scoped: Arc::new(Mutex::new(HashMap::new())),
      });
      ServiceProvider {
         root: Scope::root(registry),
      }
   }
}

struct Registry {
   registrations: HashMap<TypeId, Registration>,
   singletons: Cache,
   /// Scoped instances of the provider's root scope
   root_scoped: Arc<Cache>,
}

/// Resolves services; owns singleton instances.
pub struct ServiceProvider {
   root: Scope,
}

impl ServiceProvider {
   /// Start a new scope. Scoped services are shared within it.
   pub fn create_scope(&self) -> Scope {
      Scope::new(Arc::clone(&self.root.registry))
   }

   /// Resolve from the root scope.
   pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
      self.root.resolve::<S>()
   }
}

/// A resolution scope. Cloning a scope shares its scoped instances.
#[derive(Clone)]
pub struct Scope {
   registry: Arc<Registry>,
   scoped: Arc<Cache>,
}

impl Scope {
   fn new(registry: Arc<Registry>) -> Self {
      Self {
         registry,
         scoped: Arc::new(Mutex::new(HashMap::new())),
      }
   }

   /// The provider's root scope. Singletons are always built from it, so they
   /// never capture the scoped instances of the scope that first asked.
   fn root(registry: Arc<Registry>) -> Self {
      let scoped = Arc::clone(&registry.root_scoped);
      Self { registry, scoped }
   }

   pub fn resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
      let key = TypeId::of::<S>();
      let name = type_name::<S>();

      let registration = self
         .registry
         .registrations
         .get(&key)
         .ok_or(Error::ServiceNotRegistered(name))?;

      let instance = match registration.lifetime {
         Lifetime::Transient => (registration.build)(self)?,
         Lifetime::Scoped => cached(&self.scoped, key, || (registration.build)(self))?,
         Lifetime::Singleton => cached(&self.registry.singletons, key, || {
            (registration.build)(&Scope::root(Arc::clone(&self.registry)))
         })?,
      };

      trace!(service = registration.name, lifetime = %registration.lifetime, "Resolved service");

      instance
         .downcast_ref::<Arc<S>>()
         .cloned()
         .ok_or(Error::ServiceTypeMismatch(name))
   }
}

/// Return the cached instance for `key`, building it outside the lock so a
/// factory may resolve its own dependencies from the same cache.
fn cached(
   cache: &Cache,
   key: TypeId,
   build: impl FnOnce() -> Result<Instance>,
) -> Result<Instance> {
   if let Some(instance) = cache.lock().get(&key) {
      return Ok(Arc::clone(instance));
   }

   let built = build()?;
   let mut cache = cache.lock();
   Ok(Arc::clone(cache.entry(key).or_insert(built)))
}

/// Register connection type `C`, built from `connection_string`.
///
/// The connection is created unopened; sessions open it. Fails with
/// [`Error::InvalidArgument`] for an empty connection string. A malformed
/// string surfaces as [`Error::Connection`] when the connection is resolved.
pub fn register_connection<C>(
   services: &mut ServiceCollection,
   connection_string: impl Into<String>,
   options: ConnectionRegistration,
) -> Result<()>
where
   C: FromConnectionString + Send + Sync + 'static,
{
   let connection_string: String = connection_string.into();
   if connection_string.trim().is_empty() {
      return Err(Error::InvalidArgument(
         "connection string must not be empty".into(),
      ));
   }

   services.add::<C, _>(options.lifetime, move |_| {
      C::from_connection_string(&connection_string)
         .map(Arc::new)
         .map_err(|e| Error::Connection(Box::new(e)))
   });

   if options.register_factory {
      services.add_factory::<C>();
   }

   debug!(
      connection = type_name::<C>(),
      lifetime = %options.lifetime,
      factory = options.register_factory,
      "Registered connection"
   );
   Ok(())
}

/// Register session implementation `I` as abstraction `A`.
///
/// `I` is built by [`Injectable::inject`] and converted with [`Provides`].
/// Whether a [`Factory<A>`] is also registered is decided by
/// `options.register_factory`, falling back to the collection's
/// [`RegistrationDefaults`].
pub fn register_session<A, I>(services: &mut ServiceCollection, options: SessionRegistration)
where
   A: ?Sized + Send + Sync + 'static,
   I: Injectable + Provides<A>,
{
   services.add::<A, _>(options.lifetime, |scope| {
      let implementation = Arc::new(I::inject(scope)?);
      Ok(<I as Provides<A>>::provide(implementation))
   });

   let register_factory = options
      .register_factory
      .unwrap_or(services.defaults().register_session_factories);

   if register_factory {
      services.add_factory::<A>();
   }

   debug!(
      abstraction = type_name::<A>(),
      implementation = type_name::<I>(),
      lifetime = %options.lifetime,
      factory = register_factory,
      "Registered session"
   );
}
