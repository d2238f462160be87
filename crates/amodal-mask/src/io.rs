//! PLY mesh loading and saving.
//!
//! ASCII and binary PLY files are read through `ply-rs`. Vertices need
//! `x`, `y` and `z`; optional `red`, `green` and `blue` properties (8-bit
//! or float) become vertex colors. Polygonal faces are fan-triangulated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use amodal_core::{TriangleMesh, Vec3, DEFAULT_VERTEX_COLOR};
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;

use crate::error::{PipelineError, Result};

/// Loads a triangle mesh from a PLY file.
pub fn load_ply(path: impl AsRef<Path>) -> Result<TriangleMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let invalid = |message: String| PipelineError::Ply {
        path: path.to_path_buf(),
        message,
    };

    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(&mut reader)
        .map_err(|e| invalid(format!("failed to parse header: {e}")))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| invalid(format!("failed to read payload: {e}")))?;

    let vertex_elements = payload.get("vertex").map_or(&[][..], Vec::as_slice);
    let mut positions = Vec::with_capacity(vertex_elements.len());
    let mut colors = Vec::with_capacity(vertex_elements.len());
    for (i, element) in vertex_elements.iter().enumerate() {
        let coord = |key: &str| {
            get_float_property(element, key)
                .ok_or_else(|| invalid(format!("vertex {i} has no numeric '{key}' property")))
        };
        positions.push(Vec3::new(coord("x")?, coord("y")?, coord("z")?));
        colors.push(get_color(element));
    }

    let has_colors = !colors.is_empty() && colors.iter().all(Option::is_some);
    let colors = if has_colors {
        colors.into_iter().flatten().collect()
    } else {
        vec![DEFAULT_VERTEX_COLOR; positions.len()]
    };

    let mut triangles = Vec::new();
    if let Some(face_elements) = payload.get("face") {
        triangles.reserve(face_elements.len());
        for (i, element) in face_elements.iter().enumerate() {
            let indices = get_index_list(element)
                .ok_or_else(|| invalid(format!("face {i} has no valid vertex index list")))?;
            if indices.len() < 3 {
                log::warn!("{}: skipping face {i} with {} vertices", path.display(), indices.len());
                continue;
            }
            for k in 1..indices.len() - 1 {
                triangles.push([indices[0], indices[k], indices[k + 1]]);
            }
        }
    }

    let mesh = TriangleMesh::new(positions, triangles, colors).map_err(|e| invalid(e.to_string()))?;
    log::debug!(
        "loaded {}: {} vertices, {} triangles",
        path.display(),
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

/// Saves a mesh as ASCII PLY with 8-bit vertex colors.
pub fn save_ply(mesh: &TriangleMesh, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header.comments.push("masked mesh written by amodal-mask".to_string());

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for key in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    for key in ["red", "green", "blue"] {
        vertex_def.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
    vertex_def.count = mesh.vertex_count();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::UInt),
    ));
    face_def.count = mesh.face_count();
    ply.header.elements.add(face_def);

    let vertices = mesh
        .positions()
        .iter()
        .zip(mesh.colors())
        .map(|(p, c)| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(p.x));
            element.insert("y".to_string(), Property::Float(p.y));
            element.insert("z".to_string(), Property::Float(p.z));
            element.insert("red".to_string(), Property::UChar(color_channel(c.x)));
            element.insert("green".to_string(), Property::UChar(color_channel(c.y)));
            element.insert("blue".to_string(), Property::UChar(color_channel(c.z)));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces = mesh
        .triangles()
        .iter()
        .map(|tri| {
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListUInt(tri.to_vec()));
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| PipelineError::io(path, e))?;
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

fn get_float_property(element: &DefaultElement, key: &str) -> Option<f32> {
    match element.get(key)? {
        Property::Float(v) => Some(*v),
        #[allow(clippy::cast_possible_truncation)]
        Property::Double(v) => Some(*v as f32),
        _ => None,
    }
}

/// Reads one color channel, normalized to `[0, 1]`.
fn get_channel(element: &DefaultElement, key: &str) -> Option<f32> {
    match element.get(key)? {
        Property::UChar(v) => Some(f32::from(*v) / 255.0),
        Property::UShort(v) => Some(f32::from(*v) / 65535.0),
        _ => get_float_property(element, key),
    }
}

fn get_color(element: &DefaultElement) -> Option<Vec3> {
    Some(Vec3::new(
        get_channel(element, "red")?,
        get_channel(element, "green")?,
        get_channel(element, "blue")?,
    ))
}

/// Face index list as `u32`. `None` if missing or holding a negative index.
fn get_index_list(element: &DefaultElement) -> Option<Vec<u32>> {
    for key in ["vertex_indices", "vertex_index"] {
        let Some(prop) = element.get(key) else {
            continue;
        };
        return match prop {
            Property::ListUInt(v) => Some(v.clone()),
            Property::ListInt(v) => v.iter().map(|&i| u32::try_from(i).ok()).collect(),
            Property::ListUShort(v) => Some(v.iter().map(|&i| u32::from(i)).collect()),
            Property::ListShort(v) => v.iter().map(|&i| u32::try_from(i).ok()).collect(),
            Property::ListUChar(v) => Some(v.iter().map(|&i| u32::from(i)).collect()),
            Property::ListChar(v) => v.iter().map(|&i| u32::try_from(i).ok()).collect(),
            _ => None,
        };
    }
    None
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn color_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
