//! Route table construction: pattern compilation, collection from
//! route-definition files, and the provider that serves a table to the
//! dispatcher.

mod collector;
mod loader;
mod pattern;
mod provider;
mod table;

pub use collector::RouteCollector;
pub use loader::{collect_files, is_api_file, RouteFile};
pub use provider::RouteTableProvider;
pub use table::{
    BeforeAll, FilterBinding, FilterSpec, HandlerRef, RouteEntry, RouteTable, VariableRoute,
    VariableRouteGroup, GROUP_CHUNK_SIZE,
};
