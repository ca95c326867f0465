//! sitewall Core
//!
//! The personal block list: input normalization, the persisted rule store,
//! its synchronization with the dynamic rule set, and the page-load
//! fallback check.

mod entry;
mod fallback;
mod normalize;
mod origin;
mod storage;
mod store;
mod sync;

pub use entry::{BlockEntry, ENTRIES_KEY, NEXT_ID_KEY, RuleStoreState, load_entries};
pub use fallback::{FallbackMatcher, NavigationError, PageNavigator, matches, matching_entry};
pub use normalize::{InputKind, Normalized, classify, normalize, strip_www};
pub use origin::{EXTENSION_SCHEME, ExtensionOrigin};
pub use storage::{FileStorage, KeyValueStore, MemoryStorage, StorageError, StorageItems};
pub use store::{AddOutcome, RuleStore, StoreError};
pub use sync::{BLOCKED_PAGE_PATH, DEFAULT_RULE_PRIORITY, RuleSynchronizer, SyncConfig};
