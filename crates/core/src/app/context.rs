use std::sync::Arc;

use crate::domain::model::AppConfig;
use crate::ports::clock::Clock;
use crate::ports::search::SearchApi;
use crate::ports::store::ObjectStore;

/// Bundles the runtime dependencies a
/// backfill run needs (configuration,
/// search client, object store and
/// clock).
pub struct AppContext<S, O, C>
where
  S: SearchApi + ?Sized,
  O: ObjectStore + ?Sized,
  C: Clock + ?Sized
{
  pub cfg:    Arc<AppConfig>,
  pub search: Arc<S>,
  pub store:  Arc<O>,
  pub clock:  Arc<C>
}

impl<S, O, C> Clone for AppContext<S, O, C>
where
  S: SearchApi + ?Sized,
  O: ObjectStore + ?Sized,
  C: Clock + ?Sized
{
  fn clone(&self) -> Self {
    Self {
      cfg:    Arc::clone(&self.cfg),
      search: Arc::clone(&self.search),
      store:  Arc::clone(&self.store),
      clock:  Arc::clone(&self.clock)
    }
  }
}
