use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{load_field_image, FieldImage};
use crate::geometry::{Outline, WorldRect};

/// One image as placed on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneImage {
    pub name: String,
    pub path: PathBuf,
    pub outline: Outline,
    #[serde(default)]
    pub rotation: f64,
}

/// A reference/target pair plus an optional region of interest, as read by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub reference: SceneImage,
    pub target: SceneImage,
    #[serde(default)]
    pub roi: Option<WorldRect>,
}

impl Scene {
    /// Read a scene from TOML or JSON; image paths resolve against the scene's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;

        let mut scene: Scene = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        if let Some(base) = path.parent() {
            for image in [&mut scene.reference, &mut scene.target] {
                if image.path.is_relative() {
                    image.path = base.join(&image.path);
                }
            }
        }
        Ok(scene)
    }

    pub fn load_images(&self) -> crate::Result<(FieldImage, FieldImage)> {
        let reference = load_scene_image(&self.reference)?;
        let target = load_scene_image(&self.target)?;
        Ok((reference, target))
    }
}

fn load_scene_image(image: &SceneImage) -> crate::Result<FieldImage> {
    load_field_image(&image.path, &image.name, image.outline, image.rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_scene_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.toml");
        fs::write(
            &path,
            r#"
[reference]
name = "overview"
path = "overview.png"
outline = { xmin = 0.0, xmax = 100.0, ymin = 0.0, ymax = 80.0 }

[target]
name = "detail"
path = "/data/detail.png"
outline = { xmin = 20.0, xmax = 40.0, ymin = 10.0, ymax = 30.0, z = [0.0, 5.0] }
rotation = 12.5

[roi]
x0 = 15.0
y0 = 5.0
x1 = 45.0
y1 = 35.0
"#,
        )
        .unwrap();

        let scene = Scene::load(&path).unwrap();
        assert_eq!(scene.reference.path, dir.path().join("overview.png"));
        assert_eq!(scene.target.path, PathBuf::from("/data/detail.png"));
        assert_eq!(scene.target.rotation, 12.5);
        assert_eq!(scene.target.outline.z, Some((0.0, 5.0)));
        assert_eq!(scene.roi, Some(WorldRect::new(15.0, 5.0, 45.0, 35.0)));
    }

    #[test]
    fn test_load_json_scene_without_roi() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.json");
        fs::write(
            &path,
            r#"{
  "reference": {"name": "a", "path": "a.png", "outline": {"xmin": 0, "xmax": 1, "ymin": 0, "ymax": 1}},
  "target": {"name": "b", "path": "b.png", "outline": {"xmin": 0, "xmax": 1, "ymin": 0, "ymax": 1}}
}"#,
        )
        .unwrap();

        let scene = Scene::load(&path).unwrap();
        assert!(scene.roi.is_none());
        assert_eq!(scene.target.rotation, 0.0);
    }
}
