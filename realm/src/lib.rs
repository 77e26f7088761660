pub mod config;
pub mod http_api;
pub mod http_pool;
pub mod local_store;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod views;

pub use config::*;
pub use http_api::HttpGameApi;
pub use http_pool::{HttpPool, HttpResponse};
pub use local_store::FileCredentialStore;
pub use notify::NotificationChannel;
pub use orchestrator::{parse_amount, Action, MutationOrchestrator};
pub use session::*;
pub use store::{CollectionStore, LoadOutcome, PlayerState, StoreSnapshot};
pub use views::CollectionView;
