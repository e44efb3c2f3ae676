/// Name the GraphQL engine uses for the venue database
pub const DEFAULT_DATABASE_NAME: &str = "Aerie";

/// Default location of the hasura project
pub const DEFAULT_HASURA_PATH: &str = "./hasura";

/// Port the workspace server listens on next to the GraphQL engine
pub const WORKSPACE_SERVER_PORT: u16 = 28000;

/// Trim whitespace and trailing slashes from an endpoint URL
pub fn sanitize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

/// Guess the workspace server URL from the GraphQL endpoint by swapping the port
pub fn derive_workspace_endpoint(hasura_endpoint: &str) -> String {
    let endpoint = sanitize_endpoint(hasura_endpoint);

    // Only treat the last ':' as a port separator when digits follow it.
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}:{}", host, WORKSPACE_SERVER_PORT)
        }
        _ => format!("{}:{}", endpoint, WORKSPACE_SERVER_PORT),
    }
}
