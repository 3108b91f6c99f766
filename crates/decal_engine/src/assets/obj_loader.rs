//! OBJ file loader for decal target models
//!
//! Faces are grouped into one mesh node per (object, material) run so every
//! node carries exactly one material. Vertices are deduplicated per node on
//! their `v/vt/vn` triple. A node whose faces lack `vt` references gets no
//! UV attribute at all, which the UV analyzer reports as `NO_UVS`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::foundation::collections::MaterialId;
use crate::foundation::color::Rgba;
use crate::foundation::math::{Vec2, Vec3};
use crate::scene::{Material, MeshGeometry, Model, TextureSource};
use super::image_loader;
use super::mtl_parser::{MtlData, MtlParser};

/// Errors raised while importing a model
#[derive(Error, Debug)]
pub enum ImportError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed line in an OBJ or MTL file
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Geometry is internally inconsistent
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The file contains no triangles
    #[error("Model contains no geometry")]
    EmptyModel,

    /// The file extension is not a supported model format
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),
}

/// In-memory model source: OBJ text plus the files it references
#[derive(Debug, Clone, Default)]
pub struct ObjSource {
    /// Model name
    pub name: String,
    /// OBJ file contents
    pub obj: String,
    /// Concatenated MTL file contents, if any
    pub mtl: Option<String>,
    /// Encoded texture files keyed by the path written in `map_Kd`
    pub textures: HashMap<String, Vec<u8>>,
}

impl ObjSource {
    /// Source with OBJ text only
    pub fn new(name: impl Into<String>, obj: impl Into<String>) -> Self {
        Self { name: name.into(), obj: obj.into(), ..Self::default() }
    }

    /// Attach MTL text
    #[must_use]
    pub fn with_mtl(mut self, mtl: impl Into<String>) -> Self {
        self.mtl = Some(mtl.into());
        self
    }

    /// Attach an encoded texture file
    #[must_use]
    pub fn with_texture(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.textures.insert(path.into(), bytes);
        self
    }
}

#[derive(Debug, Default)]
struct FaceGroup {
    name: String,
    material: String,
    corners: Vec<Corner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

/// OBJ model loader
pub struct ObjLoader;

impl ObjLoader {
    /// Load an OBJ file from disk, along with its MTL libraries and textures
    ///
    /// Missing MTL or texture files degrade to untextured materials with a
    /// warning rather than failing the import.
    pub fn load_file<P: AsRef<Path>>(path: P, target_size: f32) -> Result<Model, ImportError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("obj") => {}
            _ => return Err(ImportError::UnsupportedFormat(path.display().to_string())),
        }

        let obj = fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        let mut source = ObjSource::new(name, obj);

        let mut mtl_text = String::new();
        for lib in Self::mtl_libraries(&source.obj) {
            match fs::read_to_string(base_dir.join(&lib)) {
                Ok(text) => {
                    mtl_text.push_str(&text);
                    mtl_text.push('\n');
                }
                Err(e) => log::warn!("Could not read material library '{}': {}", lib, e),
            }
        }

        if !mtl_text.is_empty() {
            for mat in MtlParser::parse(&mtl_text)?.values() {
                if let Some(map) = &mat.diffuse_map {
                    match fs::read(base_dir.join(map)) {
                        Ok(bytes) => {
                            source.textures.insert(map.clone(), bytes);
                        }
                        Err(e) => log::warn!("Could not read texture '{}': {}", map, e),
                    }
                }
            }
            source.mtl = Some(mtl_text);
        }

        Self::load(&source, target_size)
    }

    /// Build a normalized model from an in-memory source
    pub fn load(source: &ObjSource, target_size: f32) -> Result<Model, ImportError> {
        let mtl = match &source.mtl {
            Some(text) => MtlParser::parse(text)?,
            None => HashMap::new(),
        };

        let mut positions: Vec<Vec3> = Vec::new();
        let mut uvs: Vec<Vec2> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();
        let mut groups: Vec<FaceGroup> = Vec::new();
        let mut object_name = source.name.clone();
        let mut material_name = String::new();

        for (line_num, line) in source.obj.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(command) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match command {
                "v" => positions.push(Self::parse_vec3(&args, line_num, "vertex")?),
                "vn" => normals.push(Self::parse_vec3(&args, line_num, "normal")?),
                "vt" => {
                    let u = Self::parse_float(args.first(), line_num, "tex coord u")?;
                    let v = Self::parse_float(args.get(1), line_num, "tex coord v")?;
                    uvs.push(Vec2::new(u, v));
                }
                "o" | "g" => {
                    if !args.is_empty() {
                        object_name = args.join(" ");
                    }
                }
                "usemtl" => material_name = args.join(" "),
                "f" => {
                    if args.len() < 3 {
                        return Err(ImportError::Parse {
                            line: line_num + 1,
                            message: "face needs at least three vertices".to_string(),
                        });
                    }
                    let corners = args
                        .iter()
                        .map(|token| {
                            Self::parse_corner(token, line_num, positions.len(), uvs.len(), normals.len())
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    let needs_new_group = groups
                        .last()
                        .map_or(true, |g| g.name != object_name || g.material != material_name);
                    if needs_new_group {
                        groups.push(FaceGroup {
                            name: object_name.clone(),
                            material: material_name.clone(),
                            corners: Vec::new(),
                        });
                    }
                    if let Some(group) = groups.last_mut() {
                        // Fan triangulation
                        for i in 1..corners.len() - 1 {
                            group.corners.extend([corners[0], corners[i], corners[i + 1]]);
                        }
                    }
                }
                _ => {}
            }
        }

        let mut builder = Model::builder(source.name.clone());
        let mut material_ids: HashMap<String, MaterialId> = HashMap::new();

        for group in groups {
            let material = match material_ids.get(&group.material) {
                Some(id) => *id,
                None => {
                    let id = builder.add_material(Self::build_material(&group.material, mtl.get(&group.material), source));
                    material_ids.insert(group.material.clone(), id);
                    id
                }
            };
            let geometry = Self::build_geometry(&group, &positions, &uvs, &normals);
            builder.add_mesh(group.name, geometry, material);
        }

        log::info!(
            "Parsed OBJ '{}': {} positions, {} uvs, {} mesh nodes",
            source.name,
            positions.len(),
            uvs.len(),
            builder.mesh_count()
        );

        builder.build(target_size)
    }

    /// Names listed by `mtllib` statements
    fn mtl_libraries(obj: &str) -> Vec<String> {
        obj.lines()
            .filter_map(|line| line.trim().strip_prefix("mtllib "))
            .map(|rest| rest.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn build_material(name: &str, data: Option<&MtlData>, source: &ObjSource) -> Material {
        let Some(data) = data else {
            let name = if name.is_empty() { "default" } else { name };
            return Material::new(name, Rgba::WHITE);
        };

        let texture = match &data.diffuse_map {
            None => TextureSource::None,
            Some(path) => match source.textures.get(path) {
                None => {
                    log::warn!("Texture '{}' for material '{}' is unavailable", path, name);
                    TextureSource::Unavailable(format!("missing file {path}"))
                }
                Some(bytes) => match image_loader::decode_image(bytes) {
                    Ok(image) => TextureSource::Decoded(image),
                    Err(e) => {
                        log::warn!("Texture '{}' for material '{}' failed to decode: {}", path, name, e);
                        TextureSource::Unavailable(e.to_string())
                    }
                },
            },
        };

        Material { name: data.name.clone(), base_color: data.base_color(), texture }
    }

    fn build_geometry(group: &FaceGroup, positions: &[Vec3], uvs: &[Vec2], normals: &[Vec3]) -> MeshGeometry {
        let with_uvs = group.corners.iter().all(|c| c.uv.is_some());
        let with_normals = group.corners.iter().all(|c| c.normal.is_some());

        let mut lookup: HashMap<Corner, u32> = HashMap::new();
        let mut geometry = MeshGeometry {
            uvs: with_uvs.then(Vec::new),
            normals: with_normals.then(Vec::new),
            indices: Some(Vec::with_capacity(group.corners.len())),
            ..MeshGeometry::default()
        };

        for corner in &group.corners {
            let key = Corner {
                position: corner.position,
                uv: corner.uv.filter(|_| with_uvs),
                normal: corner.normal.filter(|_| with_normals),
            };
            let index = *lookup.entry(key).or_insert_with(|| {
                geometry.positions.push(positions[key.position]);
                if let (Some(out), Some(i)) = (geometry.uvs.as_mut(), key.uv) {
                    out.push(uvs[i]);
                }
                if let (Some(out), Some(i)) = (geometry.normals.as_mut(), key.normal) {
                    out.push(normals[i]);
                }
                (geometry.positions.len() - 1) as u32
            });
            if let Some(indices) = geometry.indices.as_mut() {
                indices.push(index);
            }
        }

        geometry
    }

    fn parse_vec3(args: &[&str], line_num: usize, what: &str) -> Result<Vec3, ImportError> {
        Ok(Vec3::new(
            Self::parse_float(args.first(), line_num, what)?,
            Self::parse_float(args.get(1), line_num, what)?,
            Self::parse_float(args.get(2), line_num, what)?,
        ))
    }

    fn parse_float(token: Option<&&str>, line_num: usize, what: &str) -> Result<f32, ImportError> {
        token
            .and_then(|t| t.parse::<f32>().ok())
            .ok_or_else(|| ImportError::Parse { line: line_num + 1, message: format!("invalid {what}") })
    }

    /// Parse one `v`, `v/vt`, `v//vn` or `v/vt/vn` face corner
    ///
    /// Indices are 1-based; negative indices count back from the end.
    fn parse_corner(
        token: &str,
        line_num: usize,
        position_count: usize,
        uv_count: usize,
        normal_count: usize,
    ) -> Result<Corner, ImportError> {
        let resolve = |raw: Option<&str>, count: usize, what: &str| -> Result<Option<usize>, ImportError> {
            let Some(raw) = raw.filter(|s| !s.is_empty()) else {
                return Ok(None);
            };
            let err = || ImportError::Parse {
                line: line_num + 1,
                message: format!("invalid {what} index '{raw}'"),
            };
            let value: i64 = raw.parse().map_err(|_| err())?;
            let index = match value {
                v if v > 0 => v - 1,
                v if v < 0 => count as i64 + v,
                _ => return Err(err()),
            };
            if index < 0 || index as usize >= count {
                return Err(err());
            }
            Ok(Some(index as usize))
        };

        let mut fields = token.split('/');
        let position = resolve(fields.next(), position_count, "position")?.ok_or_else(|| ImportError::Parse {
            line: line_num + 1,
            message: "face corner missing position".to_string(),
        })?;
        let uv = resolve(fields.next(), uv_count, "tex coord")?;
        let normal = resolve(fields.next(), normal_count, "normal")?;

        Ok(Corner { position, uv, normal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD_OBJ: &str = "\
mtllib quad.mtl
o Quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl Paint
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_with_material() {
        let source = ObjSource::new("quad", QUAD_OBJ).with_mtl("newmtl Paint\nKd 1 0 0\n");
        let model = ObjLoader::load(&source, 2.0).unwrap();

        assert_eq!(model.mesh_count(), 1);
        let (_, node) = model.meshes().next().unwrap();
        assert_eq!(node.name, "Quad");
        assert_eq!(node.geometry.triangle_count(), 2);
        assert_eq!(node.geometry.positions.len(), 4);
        assert!(node.geometry.uvs.is_some());
        assert!(node.geometry.normals.is_some());

        let material = model.material(node.material).unwrap();
        assert_eq!(material.name, "Paint");
        assert_eq!(material.base_color, Rgba::rgb(255, 0, 0));
        assert!(matches!(material.texture, TextureSource::None));
    }

    #[test]
    fn test_missing_tex_coords_means_no_uvs() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let model = ObjLoader::load(&ObjSource::new("tri", obj), 2.0).unwrap();
        let (_, node) = model.meshes().next().unwrap();
        assert!(node.geometry.uvs.is_none());
    }

    #[test]
    fn test_groups_split_by_material() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
usemtl A
f 1 2 3
usemtl B
f 2 4 3
usemtl A
f -4 -3 -2
";
        let model = ObjLoader::load(&ObjSource::new("split", obj), 2.0).unwrap();
        assert_eq!(model.mesh_count(), 3);
        assert_eq!(model.materials().count(), 2);
        assert_eq!(model.used_materials().len(), 2);
    }

    #[test]
    fn test_missing_texture_is_unavailable() {
        let source = ObjSource::new("quad", QUAD_OBJ)
            .with_mtl("newmtl Paint\nmap_Kd paint.png\n");
        let model = ObjLoader::load(&source, 2.0).unwrap();
        let (_, material) = model.materials().next().unwrap();
        assert!(matches!(material.texture, TextureSource::Unavailable(_)));
    }

    #[test]
    fn test_texture_is_decoded() {
        let png = image_loader::encode_png(&image_loader::solid_color(4, 4, Rgba::rgb(0, 0, 255))).unwrap();
        let source = ObjSource::new("quad", QUAD_OBJ)
            .with_mtl("newmtl Paint\nmap_Kd paint.png\n")
            .with_texture("paint.png", png);
        let model = ObjLoader::load(&source, 2.0).unwrap();
        let (_, material) = model.materials().next().unwrap();
        match &material.texture {
            TextureSource::Decoded(img) => assert_eq!(img.dimensions(), (4, 4)),
            other => panic!("expected decoded texture, got {other:?}"),
        }
    }

    #[test]
    fn test_normalized_to_target_size() {
        let obj = "v 0 0 0\nv 10 0 0\nv 0 5 0\nf 1 2 3\n";
        let model = ObjLoader::load(&ObjSource::new("big", obj), 2.0).unwrap();
        assert_relative_eq!(model.bounds().max_dimension(), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_malformed_input() {
        let bad_index = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(
            ObjLoader::load(&ObjSource::new("bad", bad_index), 2.0),
            Err(ImportError::Parse { line: 2, .. })
        ));

        let bad_float = "v 0 zero 0\n";
        assert!(matches!(
            ObjLoader::load(&ObjSource::new("bad", bad_float), 2.0),
            Err(ImportError::Parse { line: 1, .. })
        ));

        assert!(matches!(
            ObjLoader::load(&ObjSource::new("empty", "# nothing\n"), 2.0),
            Err(ImportError::EmptyModel)
        ));
    }

    #[test]
    fn test_load_file_reads_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("quad.obj"), QUAD_OBJ).unwrap();
        fs::write(dir.path().join("quad.mtl"), "newmtl Paint\nKd 0 1 0\n").unwrap();

        let model = ObjLoader::load_file(dir.path().join("quad.obj"), 2.0).unwrap();
        assert_eq!(model.name(), "quad");
        let (_, material) = model.materials().next().unwrap();
        assert_eq!(material.base_color, Rgba::rgb(0, 255, 0));

        assert!(matches!(
            ObjLoader::load_file(dir.path().join("quad.fbx"), 2.0),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }
}
