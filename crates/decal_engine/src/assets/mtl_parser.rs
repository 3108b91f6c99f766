//! MTL (Material Template Library) file parser
//!
//! Only the properties that affect how a decal surface looks are kept: the
//! diffuse color, opacity, and the diffuse texture map.

use std::collections::HashMap;

use crate::foundation::color::Rgba;
use super::ImportError;

/// Parsed MTL material data
#[derive(Debug, Clone, PartialEq)]
pub struct MtlData {
    /// Material name
    pub name: String,
    /// Diffuse color (Kd)
    pub diffuse: [f32; 3],
    /// Dissolve/opacity (d) - 0.0 = transparent, 1.0 = opaque
    pub dissolve: f32,
    /// Diffuse texture map (map_Kd)
    pub diffuse_map: Option<String>,
}

impl MtlData {
    /// Diffuse color and opacity as an 8-bit color
    pub fn base_color(&self) -> Rgba {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba::new(
            to_u8(self.diffuse[0]),
            to_u8(self.diffuse[1]),
            to_u8(self.diffuse[2]),
            to_u8(self.dissolve),
        )
    }
}

impl Default for MtlData {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: [0.8, 0.8, 0.8],
            dissolve: 1.0,
            diffuse_map: None,
        }
    }
}

/// MTL file parser
pub struct MtlParser;

impl MtlParser {
    /// Parse MTL file contents into a map of material name -> MtlData
    pub fn parse(contents: &str) -> Result<HashMap<String, MtlData>, ImportError> {
        let mut materials = HashMap::new();
        let mut current: Option<MtlData> = None;

        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let Some(command) = tokens.next() else {
                continue;
            };

            match command {
                "newmtl" => {
                    if let Some(mat) = current.take() {
                        materials.insert(mat.name.clone(), mat);
                    }
                    let name = tokens.collect::<Vec<_>>().join(" ");
                    if name.is_empty() {
                        return Err(Self::error(line_num, "newmtl missing material name"));
                    }
                    current = Some(MtlData { name, ..MtlData::default() });
                }
                "Kd" => {
                    if let Some(mat) = current.as_mut() {
                        let r = Self::parse_f32(&mut tokens, line_num, "Kd")?;
                        let g = Self::parse_f32(&mut tokens, line_num, "Kd")?;
                        let b = Self::parse_f32(&mut tokens, line_num, "Kd")?;
                        mat.diffuse = [r, g, b];
                    }
                }
                "d" => {
                    if let Some(mat) = current.as_mut() {
                        mat.dissolve = Self::parse_f32(&mut tokens, line_num, "d")?;
                    }
                }
                "Tr" => {
                    // Transparency is inverted dissolve
                    if let Some(mat) = current.as_mut() {
                        mat.dissolve = 1.0 - Self::parse_f32(&mut tokens, line_num, "Tr")?;
                    }
                }
                "map_Kd" => {
                    if let Some(mat) = current.as_mut() {
                        mat.diffuse_map = Some(Self::parse_texture_path(tokens, line_num)?);
                    }
                }
                _ => {}
            }
        }

        if let Some(mat) = current {
            materials.insert(mat.name.clone(), mat);
        }

        log::debug!("Parsed {} MTL materials", materials.len());
        Ok(materials)
    }

    fn error(line_num: usize, message: &str) -> ImportError {
        ImportError::Parse { line: line_num + 1, message: message.to_string() }
    }

    fn parse_f32<'a, I>(tokens: &mut I, line_num: usize, command: &str) -> Result<f32, ImportError>
    where
        I: Iterator<Item = &'a str>,
    {
        let token = tokens
            .next()
            .ok_or_else(|| Self::error(line_num, &format!("{command} missing value")))?;
        token
            .parse::<f32>()
            .map_err(|_| Self::error(line_num, &format!("{command} invalid float value '{token}'")))
    }

    /// Texture path is the rest of the line after any `-option value` pairs
    fn parse_texture_path<'a, I>(tokens: I, line_num: usize) -> Result<String, ImportError>
    where
        I: Iterator<Item = &'a str>,
    {
        let tokens: Vec<&str> = tokens.collect();
        let mut start = 0;
        while start < tokens.len() && tokens[start].starts_with('-') {
            // Options take between one and three numeric arguments
            start += 1;
            while start < tokens.len() - 1 && tokens[start].parse::<f32>().is_ok() {
                start += 1;
            }
        }
        let path = tokens[start.min(tokens.len())..].join(" ");
        if path.is_empty() {
            return Err(Self::error(line_num, "map_Kd missing texture path"));
        }
        Ok(path)
    }
}
