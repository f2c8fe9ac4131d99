// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use viewer_platform::WindowConfig;
use viewer_render_vk::{DeviceConfig, PresentModePreference, ShaderSource};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        Self {
            title: w.title,
            width: w.width,
            height: w.height,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
}

impl From<PresentModeCfg> for PresentModePreference {
    fn from(m: PresentModeCfg) -> Self {
        match m {
            PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
            PresentModeCfg::Fifo => PresentModePreference::Fifo,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub validation: bool,
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            validation: cfg!(debug_assertions),
            shader_dir: None,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.01, 0.1, 0.1, 1.0]
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ControllerCfg {
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        let c = viewer_math::KeyboardController::default();
        Self {
            move_speed: c.move_speed,
            look_speed: c.look_speed,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SceneCfg {
    /// Radians per second around the cube's Y axis; 0 keeps it still.
    pub spin_speed: f32,
}

impl Default for SceneCfg {
    fn default() -> Self {
        Self { spin_speed: 0.5 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub controller: ControllerCfg,
    pub scene: SceneCfg,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub shader_dir: Option<PathBuf>,
    pub present_mode: Option<PresentModeCfg>,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Missing file gives defaults; an unreadable or malformed one is logged and ignored.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("cannot read {}: {e}; using defaults", path.display());
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("malformed config {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(w) = o.width {
            self.window.width = w;
        }
        if let Some(h) = o.height {
            self.window.height = h;
        }
        if let Some(dir) = &o.shader_dir {
            self.render.shader_dir = Some(dir.clone());
        }
        if let Some(mode) = o.present_mode {
            self.render.present_mode = mode;
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            validation: self.render.validation,
            present_mode: self.render.present_mode.into(),
        }
    }

    pub fn shader_source(&self) -> ShaderSource {
        match &self.render.shader_dir {
            Some(dir) => ShaderSource::Directory(dir.clone()),
            None => ShaderSource::Embedded,
        }
    }
}
