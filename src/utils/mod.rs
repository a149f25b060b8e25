// Utility functions

pub mod logger;
pub mod shutdown;

pub use logger::*;
pub use shutdown::*;

/// Lease owner id for this process: `{hostname}-{pid}`.
pub fn worker_identity() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_identity_ends_with_pid() {
        let id = worker_identity();
        assert!(id.ends_with(&format!("-{}", std::process::id())));
    }
}
