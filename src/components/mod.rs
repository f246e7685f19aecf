//! Proxy components
//!
//! Each submodule owns one stage of the request pipeline: expression
//! compilation, route selection, asset-prefix matching, header rewriting,
//! HTML/CSS body rewriting, preload synthesis, and the proxy handler that
//! composes them.

pub mod assets;
pub mod css;
pub mod headers;
pub mod html;
pub mod path_expr;
pub mod preload;
pub mod proxy;
pub mod router;

pub use assets::AssetPrefixSet;
pub use path_expr::CompiledPath;
pub use proxy::ProxyOptions;
pub use router::{RouteTable, Selection};
