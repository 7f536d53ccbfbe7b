//! Bridge configuration – reads/writes `~/.legbridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use legbridge_hal::ConnectionSettings;
use legbridge_kernel::BootSequence;
use legbridge_perception::OdomFrames;
use legbridge_runtime::{BridgeSettings, FeedRates};
use legbridge_types::{BridgeError, OdomFrameMode};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSection {
    pub hostname: String,
    pub username: String,
    #[serde(skip_serializing_if = "password_is_empty")]
    pub password: Zeroizing<String>,
    /// Seconds the robot keeps running without an e-stop check-in.
    pub estop_timeout_secs: f64,
}

fn password_is_empty(password: &Zeroizing<String>) -> bool {
    password.is_empty()
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            hostname: "192.168.80.3".to_string(),
            username: "user".to_string(),
            password: Zeroizing::new(String::new()),
            estop_timeout_secs: 9.0,
        }
    }
}

impl std::fmt::Debug for RobotSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotSection")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("estop_timeout_secs", &self.estop_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootSection {
    pub auto_claim: bool,
    pub auto_power_on: bool,
    pub auto_stand: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSection {
    /// Parent frame of the body: `odom` or `vision`.
    pub mode: String,
    pub kinematic_odom: String,
    pub vision_odom: String,
}

impl Default for FrameSection {
    fn default() -> Self {
        Self {
            mode: "odom".to_string(),
            kinematic_odom: "odom".to_string(),
            vision_odom: "vision".to_string(),
        }
    }
}

/// Rates in Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSection {
    pub robot_state: f64,
    pub metrics: f64,
    pub leases: f64,
    pub front_images: f64,
    pub side_images: f64,
    pub rear_images: f64,
    pub status: f64,
}

impl Default for RateSection {
    fn default() -> Self {
        let feeds = FeedRates::default();
        Self {
            robot_state: feeds.robot_state,
            metrics: feeds.metrics,
            leases: feeds.leases,
            front_images: feeds.front_images,
            side_images: feeds.side_images,
            rear_images: feeds.rear_images,
            status: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSection {
    pub deadzone: f64,
}

impl Default for MotionSection {
    fn default() -> Self {
        Self { deadzone: 0.05 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// WebSocket mirror port.
    pub ws_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { ws_port: 9090 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted configuration stored in `~/.legbridge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub robot: RobotSection,
    pub boot: BootSection,
    pub frames: FrameSection,
    pub rates: RateSection,
    pub motion: MotionSection,
    pub server: ServerSection,
}

impl Config {
    /// Turn the raw file values into typed bridge settings.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Config`] for an empty hostname, a bad e-stop timeout,
    /// or an odometry mode other than `odom` / `vision`, plus anything
    /// [`BridgeSettings::validate`] rejects.
    pub fn validate(&self) -> Result<BridgeSettings, BridgeError> {
        if self.robot.hostname.trim().is_empty() {
            return Err(BridgeError::Config("robot.hostname is empty".into()));
        }
        let estop_timeout = Duration::try_from_secs_f64(self.robot.estop_timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "robot.estop_timeout_secs must be positive, got {}",
                    self.robot.estop_timeout_secs
                ))
            })?;
        let mode: OdomFrameMode = self.frames.mode.parse()?;

        let settings = BridgeSettings::new(ConnectionSettings {
            hostname: self.robot.hostname.clone(),
            username: self.robot.username.clone(),
            password: self.robot.password.clone(),
            estop_timeout,
        })
        .with_boot(BootSequence {
            auto_claim: self.boot.auto_claim,
            auto_power_on: self.boot.auto_power_on,
            auto_stand: self.boot.auto_stand,
        })
        .with_frames(OdomFrames {
            kinematic: self.frames.kinematic_odom.clone(),
            vision: self.frames.vision_odom.clone(),
            mode,
        })
        .with_rates(FeedRates {
            robot_state: self.rates.robot_state,
            metrics: self.rates.metrics,
            leases: self.rates.leases,
            front_images: self.rates.front_images,
            side_images: self.rates.side_images,
            rear_images: self.rates.rear_images,
        })
        .with_status_rate(self.rates.status)
        .with_deadzone(self.motion.deadzone);
        settings.validate()?;
        Ok(settings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paths and persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.legbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".legbridge").join("config.toml")
}

/// Load the config from `path`, applying environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `LEGBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LEGBRIDGE_HOSTNAME` | `robot.hostname` |
/// | `LEGBRIDGE_USERNAME` | `robot.username` |
/// | `LEGBRIDGE_PASSWORD` | `robot.password` |
/// | `LEGBRIDGE_ODOM_FRAME` | `frames.mode` |
/// | `LEGBRIDGE_DEADZONE` | `motion.deadzone` |
/// | `LEGBRIDGE_WS_PORT` | `server.ws_port` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LEGBRIDGE_HOSTNAME") {
        cfg.robot.hostname = v;
    }
    if let Ok(v) = std::env::var("LEGBRIDGE_USERNAME") {
        cfg.robot.username = v;
    }
    if let Ok(v) = std::env::var("LEGBRIDGE_PASSWORD") {
        cfg.robot.password = Zeroizing::new(v);
    }
    if let Ok(v) = std::env::var("LEGBRIDGE_ODOM_FRAME") {
        cfg.frames.mode = v;
    }
    if let Ok(v) = std::env::var("LEGBRIDGE_DEADZONE")
        && let Ok(deadzone) = v.parse::<f64>()
    {
        cfg.motion.deadzone = deadzone;
    }
    if let Ok(v) = std::env::var("LEGBRIDGE_WS_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.server.ws_port = port;
    }
}

/// Save the config, creating the parent directory if necessary.  Both are
/// restricted to the owner on Unix.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                BridgeError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| BridgeError::Config(format!("failed to write config at {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        (dir, path)
    }

    #[test]
    fn debug_redacts_password() {
        let mut cfg = Config::default();
        assert!(format!("{cfg:?}").contains("<not set>"));
        cfg.robot.password = Zeroizing::new("hunter2".into());
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn default_config_validates() {
        let settings = Config::default().validate().expect("valid");
        assert_eq!(settings.frames.mode, OdomFrameMode::Odom);
        assert_eq!(settings.rates, FeedRates::default());
        assert_eq!(settings.status_rate_hz, 50.0);
        assert_eq!(settings.connection.estop_timeout, Duration::from_secs(9));
        assert_eq!(settings.boot, BootSequence::default());
    }

    #[test]
    fn odometry_mode_must_be_odom_or_vision() {
        let mut cfg = Config::default();
        cfg.frames.mode = "vision".into();
        assert_eq!(cfg.validate().unwrap().frames.mode, OdomFrameMode::Vision);
        cfg.frames.mode = "map".into();
        assert!(matches!(cfg.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn bad_values_are_fatal() {
        let mut cfg = Config::default();
        cfg.robot.hostname = "  ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.robot.estop_timeout_secs = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.rates.status = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.motion.deadzone = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, path) = in_tempdir();
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_sections() {
        let (_dir, path) = in_tempdir();
        let mut cfg = Config::default();
        cfg.boot.auto_claim = true;
        cfg.frames.mode = "vision".into();
        cfg.robot.password = Zeroizing::new("secret".into());
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!(loaded.boot.auto_claim);
        assert_eq!(loaded.frames.mode, "vision");
        assert_eq!(loaded.robot.password.as_str(), "secret");
        assert_eq!(loaded.server.ws_port, 9090);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let (_dir, path) = in_tempdir();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[robot]\nhostname = \"10.0.0.7\"\n").unwrap();
        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.robot.hostname, "10.0.0.7");
        assert_eq!(loaded.robot.username, "user");
        assert_eq!(loaded.rates, RateSection::default());
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let (_dir, path) = in_tempdir();
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_legbridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".legbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: no other test reads these variables.
        unsafe {
            std::env::set_var("LEGBRIDGE_HOSTNAME", "spot-07.local");
            std::env::set_var("LEGBRIDGE_WS_PORT", "not-a-port");
            std::env::set_var("LEGBRIDGE_DEADZONE", "0.1");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot.hostname, "spot-07.local");
        assert_eq!(cfg.server.ws_port, 9090);
        assert_eq!(cfg.motion.deadzone, 0.1);
        unsafe {
            std::env::remove_var("LEGBRIDGE_HOSTNAME");
            std::env::remove_var("LEGBRIDGE_WS_PORT");
            std::env::remove_var("LEGBRIDGE_DEADZONE");
        }
    }
}
