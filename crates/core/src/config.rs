//! Engine configuration loaded from TOML.
//!
//! Every field has a default so an absent or partial file is valid:
//!
//! ```toml
//! [window]
//! title = "ember"
//! width = 1280
//! height = 720
//!
//! [renderer]
//! validation = true
//! preferred_present_mode = "mailbox"
//! pipeline_rebuild = "always"
//!
//! [assets]
//! model = "data/potato.obj"
//! texture = "data/potato.png"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ember.toml";

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub assets: AssetsConfig,
    pub camera: CameraConfig,
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Present mode tried first; FIFO is always the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
}

/// Which swapchain-dependent objects a resize rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRebuild {
    /// Render pass and pipeline are recreated on every swapchain rebuild.
    #[default]
    Always,
    /// Render pass and pipeline are recreated only when the surface format changes.
    OnFormatChange,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable `VK_LAYER_KHRONOS_validation` when it is installed.
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub preferred_present_mode: PresentModePreference,
    pub pipeline_rebuild: PipelineRebuild,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            preferred_present_mode: PresentModePreference::default(),
            pipeline_rebuild: PipelineRebuild::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Wavefront OBJ mesh. A built-in cube is used when unset.
    pub model: Option<PathBuf>,
    /// RGBA texture. A generated checkerboard is used when unset.
    pub texture: Option<PathBuf>,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            model: None,
            texture: None,
            vertex_shader: PathBuf::from("assets/shaders/mesh.vert.spv"),
            fragment_shader: PathBuf::from("assets/shaders/mesh.frag.spv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub axis: [f32; 3],
    pub degrees_per_second: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            axis: [0.0, 0.0, 1.0],
            degrees_per_second: 25.0,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text. `origin` is only used in errors.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// read if present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml_str(&text, &path)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} found, using default configuration", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("", Path::new("empty.toml")).unwrap();
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.renderer.pipeline_rebuild, PipelineRebuild::Always);
        assert_eq!(
            cfg.renderer.preferred_present_mode,
            PresentModePreference::Mailbox
        );
        assert!(cfg.assets.model.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [window]
            width = 1024

            [renderer]
            validation = false
            preferred_present_mode = "fifo"
            pipeline_rebuild = "on_format_change"

            [assets]
            model = "data/potato.obj"
        "#;
        let cfg = EngineConfig::from_toml_str(text, Path::new("ember.toml")).unwrap();

        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.window.title, "ember");
        assert!(!cfg.renderer.validation);
        assert_eq!(cfg.renderer.preferred_present_mode, PresentModePreference::Fifo);
        assert_eq!(cfg.renderer.pipeline_rebuild, PipelineRebuild::OnFormatChange);
        assert_eq!(cfg.assets.model.as_deref(), Some(Path::new("data/potato.obj")));
        assert!(cfg.assets.texture.is_none());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let err = EngineConfig::from_toml_str("[window\nwidth = ", Path::new("bad.toml"))
            .unwrap_err();
        match err {
            Error::Config { path, .. } => assert_eq!(path, PathBuf::from("bad.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let text = "[renderer]\npipeline_rebuild = \"sometimes\"\n";
        assert!(EngineConfig::from_toml_str(text, Path::new("x.toml")).is_err());
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let result = EngineConfig::load(Some(Path::new("definitely/not/here.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let text = include_str!("../../../ember.toml");
        let cfg = EngineConfig::from_toml_str(text, Path::new("ember.toml")).unwrap();
        assert_eq!(cfg.camera.fov_y_degrees, 45.0);
        assert_eq!(cfg.animation.axis, [0.0, 0.0, 1.0]);
        assert_eq!(
            cfg.assets.vertex_shader,
            PathBuf::from("assets/shaders/mesh.vert.spv")
        );
    }

    #[test]
    fn test_sample_shader_paths_have_glsl_sources() {
        let text = include_str!("../../../ember.toml");
        let cfg = EngineConfig::from_toml_str(text, Path::new("ember.toml")).unwrap();
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");

        // mesh.vert.spv is compiled from mesh.vert
        for spirv in [&cfg.assets.vertex_shader, &cfg.assets.fragment_shader] {
            let source = root.join(spirv.with_extension(""));
            assert!(source.is_file(), "missing GLSL source {}", source.display());
        }
        assert!(text.contains("glslc"));
    }
}
