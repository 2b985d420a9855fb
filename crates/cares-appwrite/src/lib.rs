//! # Cares Appwrite
//!
//! Store implementations behind the `cares-core` strategy traits.
//!
//! ## Strategies
//!
//! - `AppwriteClient`: Appwrite REST v1 with server API key authentication
//! - `MemoryStore`: In-process store with failure injection, for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = AppwriteClient::new(AppwriteClientConfig::from(&config.appwrite))?;
//! let collection = client.get_collection("christy-cares-db", "messages").await?;
//! ```

pub mod client;
pub mod memory;

pub use self::client::*;
pub use self::memory::*;
