pub mod bytemap;
pub mod coordinator;
pub mod error;
pub mod hashslot;
pub mod lxrpow;
pub mod pool;
pub mod registry;
pub mod store;
pub mod types;
pub mod validator;
pub mod worker;

pub use bytemap::ByteMap;
pub use error::{Error, Result};
pub use lxrpow::{LxrPoW, LxrPoWParams};
pub use registry::UrlRegistry;
pub use store::MiningStore;
pub use types::{BlockHash, Settings, Solution, Submission};
pub use validator::{DnFeed, SimulatedDnFeed, Validator};
