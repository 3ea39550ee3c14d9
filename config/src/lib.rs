pub mod crypto;
pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::Settings;

/// Provider name used as the key for the stored API key.
pub const GEMINI_PROVIDER: &str = "gemini";

/// Model used for agent turns when neither the CLI nor the settings name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Model used for audio transcription.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gemini-2.0-flash-lite";

/// Maximum number of tool-execution cycles per instruction.
pub const DEFAULT_MAX_ITERATIONS: usize = 7;

/// Load environment variables from .env files.
/// First loads from ~/.env (home directory), then from ./.env (project directory).
/// Project directory values take precedence over home directory values.
/// Call this before parsing CLI args to ensure env vars are available.
pub fn load_env_file() {
    if let Some(dirs) = directories::BaseDirs::new() {
        dotenv::from_path(dirs.home_dir().join(".env")).ok();
    }

    dotenv::dotenv().ok();
}
