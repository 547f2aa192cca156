use rand::Rng;

/// Expected database schema version
/// All song libraries must use this version for compatibility
pub const EXPECTED_DB_VERSION: &str = "1";

/// Generate a unique library ID
/// Assigned once when a library database is initialized
pub fn generate_library_unique_id() -> String {
    format!(
        "lib_{}",
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(12)
            .map(char::from)
            .collect::<String>()
    )
}
