//! Socket, PID, and frame file path resolution.
//!
//! Priority for the runtime directory:
//! 1. `UIPORTAL_RUNTIME_DIR` (explicit override)
//! 2. `XDG_RUNTIME_DIR/uiportal` (Linux standard)
//! 3. `~/.uiportal` (home directory fallback)
//! 4. System temp dir (last resort)

use std::env;
use std::path::PathBuf;

/// Get the runtime directory with priority fallback.
pub fn get_runtime_dir() -> PathBuf {
    // 1. Explicit override (ignore empty)
    if let Ok(dir) = env::var("UIPORTAL_RUNTIME_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    // 2. XDG_RUNTIME_DIR (Linux standard, ignore empty)
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join("uiportal");
        }
    }

    // 3. Home directory fallback
    if let Some(home) = dirs::home_dir() {
        return home.join(".uiportal");
    }

    // 4. Last resort: temp dir
    env::temp_dir().join("uiportal")
}

pub fn get_socket_path() -> PathBuf {
    get_runtime_dir().join("daemon.sock")
}

pub fn get_pid_path() -> PathBuf {
    get_runtime_dir().join("daemon.pid")
}

/// Default location of the published overlay frame.
pub fn get_frame_path() -> PathBuf {
    get_runtime_dir().join("overlay.png")
}

/// Ensure the runtime directory exists with secure permissions (0700 on Unix).
pub fn ensure_runtime_dir() -> std::io::Result<()> {
    let dir = get_runtime_dir();
    std::fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}
