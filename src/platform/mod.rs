//! Hosting platform integrations.
//!
//! Every provider sits behind [`PlatformAdapter`]. Vercel and Netlify talk to
//! their REST APIs; every platform can also be driven through its CLI with
//! [`CliAdapter`].

pub mod adapter;
pub mod cli;
pub mod http;
pub mod netlify;
pub mod types;
pub mod vercel;

pub use adapter::{AdapterRegistry, DeploymentLookup, PlatformAdapter};
pub use cli::{CliAdapter, CliProfile, ResolvedDeployment, UrlSource};
pub use netlify::NetlifyAdapter;
pub use types::*;
pub use vercel::VercelAdapter;
