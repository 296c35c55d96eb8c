use glam::{Mat4, Vec3};
use gltf::buffer;
use itertools::izip;

use crate::{
    color::ColorRgba,
    error::{AssetError, AssetResult},
    scene_graph::renderable::{MeshGeometry, MeshVertex},
};

pub struct ModelPrimitive {
    pub index: usize,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Base colour of the primitive's material.
    pub color: ColorRgba,
    /// Node transform into the model root.
    pub transform: Mat4,
}

/// A decoded model, flattened into primitives positioned in the model's root frame.
pub struct LoadedModel {
    pub name: String,
    pub primitives: Vec<ModelPrimitive>,
}

pub type Buffers<'a> = &'a [buffer::Data];

impl LoadedModel {
    /// Decodes a binary (`.glb`) or self-contained JSON glTF.
    pub fn from_gltf_bytes(name: impl Into<String>, bytes: &[u8]) -> AssetResult<LoadedModel> {
        let (document, buffers, _images) = gltf::import_slice(bytes)?;
        let mut model = LoadedModel {
            name: name.into(),
            primitives: Vec::new(),
        };

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| AssetError::InvalidModel(format!("{}: no scenes", model.name)))?;
        for node in scene.nodes() {
            model.add_node(&node, Mat4::IDENTITY, &buffers)?;
        }

        if model.primitives.is_empty() {
            return Err(AssetError::InvalidModel(format!(
                "{}: no triangle primitives",
                model.name
            )));
        }
        Ok(model)
    }

    fn add_node(&mut self, node: &gltf::Node, parent: Mat4, buffers: Buffers) -> AssetResult<()> {
        let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::debug!(
                        "Skipping {:?} primitive in {}",
                        primitive.mode(),
                        self.name
                    );
                    continue;
                }
                self.primitives
                    .push(Self::read_primitive(&primitive, transform, buffers)?);
            }
        }
        for child in node.children() {
            self.add_node(&child, transform, buffers)?;
        }
        Ok(())
    }

    fn read_primitive(
        primitive: &gltf::Primitive,
        transform: Mat4,
        buffers: Buffers,
    ) -> AssetResult<ModelPrimitive> {
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| AssetError::InvalidModel("primitive without positions".into()))?
            .map(Vec3::from)
            .collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        if indices.iter().any(|index| *index as usize >= positions.len()) {
            return Err(AssetError::InvalidModel("index out of range".into()));
        }

        let normals: Vec<Vec3> = match reader.read_normals() {
            Some(normals) => normals.map(Vec3::from).collect(),
            None => flat_normals(&positions, &indices),
        };
        let colors: Vec<[f32; 4]> = match reader.read_colors(0) {
            Some(colors) => colors.into_rgba_f32().collect(),
            None => vec![[1.0; 4]; positions.len()],
        };

        let vertices = izip!(positions, normals, colors)
            .map(|(position, normal, color)| MeshVertex {
                position: position.to_array(),
                normal: normal.to_array(),
                color,
            })
            .collect();

        let [r, g, b, a] = primitive
            .material()
            .pbr_metallic_roughness()
            .base_color_factor();

        Ok(ModelPrimitive {
            index: primitive.index(),
            vertices,
            indices,
            color: ColorRgba::new(r, g, b, a),
            transform,
        })
    }

    /// Mesh geometry for every primitive, each with a single instance placed by `root`.
    /// `override_color` replaces the material colours.
    pub fn to_meshes(&self, root: Mat4, override_color: Option<ColorRgba>) -> Vec<MeshGeometry> {
        self.primitives
            .iter()
            .map(|primitive| {
                let color = override_color.unwrap_or(primitive.color);
                MeshGeometry::new(primitive.vertices.clone(), primitive.indices.clone())
                    .with_instance(root * primitive.transform, color)
            })
            .collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives
            .iter()
            .map(|primitive| primitive.indices.len() / 3)
            .sum()
    }
}

/// Per-vertex normals averaged from the faces sharing each vertex.
fn flat_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let normal = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        for i in [a, b, c] {
            normals[i] += normal;
        }
    }
    normals
        .into_iter()
        .map(|normal| normal.normalize_or(Vec3::Z))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    /// A single-triangle GLB with positions only.
    pub fn triangle_glb() -> Vec<u8> {
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let bin: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
        let json = format!(
            concat!(
                r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"#,
                r#""nodes":[{{"mesh":0,"translation":[0,0,2]}}],"#,
                r#""meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}}}}]}}],"#,
                r#""accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","#,
                r#""min":[0,0,0],"max":[1,1,0]}}],"#,
                r#""bufferViews":[{{"buffer":0,"byteLength":{len}}}],"#,
                r#""buffers":[{{"byteLength":{len}}}]}}"#
            ),
            len = bin.len()
        );

        let mut json = json.into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_glb_triangle() {
        let model = LoadedModel::from_gltf_bytes("triangle", &test_support::triangle_glb()).unwrap();
        assert_eq!(model.primitives.len(), 1);
        assert_eq!(model.triangle_count(), 1);

        let primitive = &model.primitives[0];
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        assert_eq!(primitive.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert!(primitive
            .transform
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));

        let meshes = model.to_meshes(Mat4::IDENTITY, Some(ColorRgba::RED));
        assert_eq!(meshes[0].instances[0].color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(LoadedModel::from_gltf_bytes("junk", b"not a model").is_err());
    }
}
