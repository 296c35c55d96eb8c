use serde::{Deserialize, Serialize};

use crate::{
    color::ColorRgba,
    messages::PointCloud,
    settings::{SelectOption, SettingsTreeField, SettingsTreeNode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Flat,
    Gradient,
    Colormap,
    /// A packed `0x00RRGGBB` field.
    Rgb,
    /// A packed `0xAARRGGBB` field.
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    #[default]
    Turbo,
    Rainbow,
}

/// Colouring settings shared by point clouds and laser scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorModeSettings {
    pub color_mode: ColorMode,
    pub flat_color: String,
    pub color_field: Option<String>,
    pub gradient: [String; 2],
    pub color_map: Colormap,
    pub explicit_alpha: f32,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl Default for ColorModeSettings {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Flat,
            flat_color: "#ffffff".to_string(),
            color_field: None,
            gradient: ["#0000ffff".to_string(), "#ff0000ff".to_string()],
            color_map: Colormap::Turbo,
            explicit_alpha: 1.0,
            min_value: None,
            max_value: None,
        }
    }
}

impl ColorModeSettings {
    /// Settings with `color_field` coloured by the turbo map when the field is available.
    pub fn for_fields(field_names: &[&str]) -> Self {
        let preferred = ["intensity", "i", "rgb", "rgba", "z"];
        let Some(field) = preferred
            .iter()
            .find(|name| field_names.contains(name))
        else {
            return Self::default();
        };
        let color_mode = match *field {
            "rgb" => ColorMode::Rgb,
            "rgba" => ColorMode::Rgba,
            _ => ColorMode::Colormap,
        };
        Self {
            color_mode,
            color_field: Some(field.to_string()),
            ..Self::default()
        }
    }

    pub fn flat(&self) -> ColorRgba {
        ColorRgba::from_hex(&self.flat_color).unwrap_or(ColorRgba::WHITE)
    }

    pub fn fields(&self, numeric_fields: &[String]) -> Vec<(String, SettingsTreeField)> {
        let modes = vec![
            SelectOption::new("Flat", "flat"),
            SelectOption::new("Color map", "colormap"),
            SelectOption::new("Gradient", "gradient"),
            SelectOption::new("RGB (packed)", "rgb"),
            SelectOption::new("RGBA (packed)", "rgba"),
        ];
        let mode_value = serde_json::to_value(self.color_mode).unwrap_or_default();
        let mut fields = vec![(
            "colorMode".to_string(),
            SettingsTreeField::select("Color mode", modes, mode_value),
        )];
        match self.color_mode {
            ColorMode::Flat => fields.push((
                "flatColor".to_string(),
                SettingsTreeField::rgba("Color", self.flat_color.clone()),
            )),
            _ => {
                let options = numeric_fields
                    .iter()
                    .map(|name| SelectOption::new(name.clone(), name.clone()))
                    .collect();
                fields.push((
                    "colorField".to_string(),
                    SettingsTreeField::select(
                        "Color by",
                        options,
                        self.color_field.clone().unwrap_or_default(),
                    ),
                ));
            }
        }
        fields
    }

    pub fn add_fields_to(&self, mut node: SettingsTreeNode, numeric_fields: &[String]) -> SettingsTreeNode {
        for (key, field) in self.fields(numeric_fields) {
            node = node.with_field(key, field);
        }
        node
    }
}

/// Turbo colormap, polynomial approximation.
pub fn turbo(t: f32) -> ColorRgba {
    let t = t.clamp(0.0, 1.0);
    let r = 0.13572138 + t * (4.6153926 + t * (-42.66032258 + t * (132.13108234 + t * (-152.94239396 + t * 59.28637943))));
    let g = 0.09140261 + t * (2.19418839 + t * (4.84296658 + t * (-14.18503333 + t * (4.27729857 + t * 2.82956604))));
    let b = 0.1066733 + t * (12.64194608 + t * (-60.58204836 + t * (110.36276771 + t * (-89.90310912 + t * 27.34824973))));
    ColorRgba::new(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0), 1.0)
}

/// HSV hue sweep from blue (0) to red (1).
pub fn rainbow(t: f32) -> ColorRgba {
    let hue = (1.0 - t.clamp(0.0, 1.0)) * (2.0 / 3.0) * 6.0;
    let x = 1.0 - (hue % 2.0 - 1.0).abs();
    let (r, g, b) = match hue as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };
    ColorRgba::new(r, g, b, 1.0)
}

/// Maps scalar values to colours according to `settings`.
pub struct PointColorizer {
    mode: ColorMode,
    flat: ColorRgba,
    gradient: [ColorRgba; 2],
    colormap: Colormap,
    alpha: f32,
    min: f64,
    max: f64,
}

impl PointColorizer {
    /// `values` is used to find the automatic value range.
    pub fn new(settings: &ColorModeSettings, values: &[f64]) -> Self {
        let (auto_min, auto_max) = values
            .iter()
            .filter(|value| value.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let min = settings.min_value.unwrap_or(if auto_min.is_finite() { auto_min } else { 0.0 });
        let max = settings.max_value.unwrap_or(if auto_max.is_finite() { auto_max } else { 1.0 });
        let parse = |hex: &str, fallback| ColorRgba::from_hex(hex).unwrap_or(fallback);
        Self {
            mode: settings.color_mode,
            flat: settings.flat(),
            gradient: [
                parse(&settings.gradient[0], ColorRgba::BLUE),
                parse(&settings.gradient[1], ColorRgba::RED),
            ],
            colormap: settings.color_map,
            alpha: settings.explicit_alpha.clamp(0.0, 1.0),
            min,
            max,
        }
    }

    fn normalized(&self, value: f64) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)) as f32
    }

    pub fn color(&self, value: f64) -> [u8; 4] {
        let color = match self.mode {
            ColorMode::Flat => return self.flat.to_rgba8(),
            ColorMode::Gradient => {
                self.gradient[0].lerp(&self.gradient[1], self.normalized(value))
            }
            ColorMode::Colormap => match self.colormap {
                Colormap::Turbo => turbo(self.normalized(value)),
                Colormap::Rainbow => rainbow(self.normalized(value)),
            },
            ColorMode::Rgb => {
                let packed = value as u32;
                let [b, g, r, _] = packed.to_le_bytes();
                return [r, g, b, (self.alpha * 255.0).round() as u8];
            }
            ColorMode::Rgba => {
                let packed = value as u32;
                let [b, g, r, a] = packed.to_le_bytes();
                return [r, g, b, a];
            }
        };
        color.with_alpha(self.alpha).to_rgba8()
    }
}

/// Reads packed colour fields as raw integers instead of their float interpretation.
pub fn packed_color_value(cloud: &PointCloud, field_name: &str, index: usize) -> Option<f64> {
    let field = cloud.field(field_name)?;
    let offset = index * cloud.point_stride + field.offset;
    let bytes = cloud.data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn colormap_endpoints() {
        let low = turbo(0.0);
        assert_relative_eq!(low.r, 0.13572138, epsilon = 1e-6);
        assert_relative_eq!(low.g, 0.09140261, epsilon = 1e-6);
        assert_relative_eq!(low.b, 0.1066733, epsilon = 1e-6);
        let mid = turbo(0.5);
        assert!(mid.g > mid.r && mid.g > mid.b);
        let high = turbo(1.0);
        assert!(high.r > high.g);
        assert_eq!(high.b, 0.0);
        assert_eq!(rainbow(0.0).to_rgba8(), [0, 0, 255, 255]);
        assert_eq!(rainbow(1.0).to_rgba8(), [255, 0, 0, 255]);
    }

    #[test]
    fn gradient_uses_value_range() {
        let settings = ColorModeSettings {
            color_mode: ColorMode::Gradient,
            gradient: ["#000000".into(), "#ffffff".into()],
            ..Default::default()
        };
        let colorizer = PointColorizer::new(&settings, &[10.0, 20.0, 30.0]);
        assert_eq!(colorizer.color(10.0), [0, 0, 0, 255]);
        assert_eq!(colorizer.color(20.0)[0], 128);
        assert_eq!(colorizer.color(30.0), [255, 255, 255, 255]);
    }

    #[test]
    fn unpacks_rgb() {
        let settings = ColorModeSettings {
            color_mode: ColorMode::Rgb,
            ..Default::default()
        };
        let colorizer = PointColorizer::new(&settings, &[]);
        assert_eq!(colorizer.color(0x00ff8000 as f64), [255, 128, 0, 255]);
    }

    #[test]
    fn picks_default_color_field() {
        let settings = ColorModeSettings::for_fields(&["x", "y", "z", "intensity"]);
        assert_eq!(settings.color_mode, ColorMode::Colormap);
        assert_eq!(settings.color_field.as_deref(), Some("intensity"));
        assert_eq!(
            ColorModeSettings::for_fields(&["x", "y", "z", "rgb"]).color_mode,
            ColorMode::Rgb
        );
    }
}
