//! Shared constants.

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILENAME: &str = "resforge.json";

/// Rust target triple for contract bytecode.
pub const DEFAULT_TARGET: &str = "wasm32-unknown-unknown";

pub const DEFAULT_PROFILE: &str = "release";

/// Resource Store directory, relative to the workspace root.
pub const DEFAULT_RES_DIR: &str = "res";

/// Strip symbols from the linked binary to keep contract bytecode small.
pub const DEFAULT_RUSTFLAGS: &str = "-C link-arg=-s";

pub const ARTIFACT_EXTENSION: &str = "wasm";

/// Every WebAssembly binary starts with `\0asm`.
pub const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// Run lock file inside the Resource Store.
pub const LOCK_FILENAME: &str = ".resforge.lock";

/// Entry ledger inside the Resource Store.
pub const MANIFEST_FILENAME: &str = ".resforge-manifest.json";

/// Directory under the cargo target dir holding per-phase arenas.
pub const STAGING_DIRNAME: &str = "resforge";

pub const ENV_RES_DIR: &str = "RESFORGE_RES_DIR";
pub const ENV_TARGET_DIR: &str = "RESFORGE_TARGET_DIR";
pub const ENV_CARGO: &str = "CARGO";
