//! Boundary to the venue: the runner CLI and the SQL query endpoint.

mod hasura;
mod query;
mod status_table;
mod types;

pub use hasura::{HasuraCli, HasuraProfile, HASURA_PROGRAM};
pub use query::HasuraQueryClient;
pub use status_table::parse_status_table;
pub use types::{
    render_rows, strip_header, MigrationRunner, Presence, RemoteError, RemoteStatusRow,
    SqlClient, StatusTable,
};
