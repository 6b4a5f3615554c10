use std::{
    collections::HashMap,
    fs,
    io::{self, Read as _},
    path::Path,
};

use glam::{Quat, Vec3};

use super::LoadError;
use crate::{sh_coeff_count, SplatCloud};

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

fn read_f32(row: &[u8], offset: usize) -> f32 {
    bytemuck::pod_read_unaligned(&row[offset..offset + 4])
}

fn scalar_size(ty: &str) -> Option<usize> {
    Some(match ty {
        "char" | "uchar" | "int8" | "uint8" => 1,
        "short" | "ushort" | "int16" | "uint16" => 2,
        "int" | "uint" | "int32" | "uint32" | "float" | "float32" => 4,
        "double" | "float64" => 8,
        _ => return None,
    })
}

fn bad_line(line: &str) -> LoadError {
    LoadError::Format(format!("malformed header line: {:?}", line.trim_end()))
}

/// Declared vertex schema: row stride plus byte offsets of the float-typed
/// scalar properties. Non-float extras only contribute to the stride.
struct Header {
    count: usize,
    stride: usize,
    offsets: HashMap<String, usize>,
}

impl Header {
    fn parse(reader: &mut impl io::BufRead) -> Result<Self, LoadError> {
        let mut count = 0;
        let mut stride = 0;
        let mut offsets = HashMap::new();
        let mut in_vertex = false;
        let mut seen_magic = false;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(LoadError::Format("header ends before end_header".into()));
            }
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            if !seen_magic {
                if keyword != "ply" {
                    return Err(LoadError::Format("not a PLY file".into()));
                }
                seen_magic = true;
                continue;
            }
            match keyword {
                "format" => {
                    let encoding = words.next().ok_or_else(|| bad_line(&line))?;
                    let version = words.next().ok_or_else(|| bad_line(&line))?;
                    if encoding != "binary_little_endian" || version != "1.0" {
                        return Err(LoadError::Format(format!(
                            "unsupported encoding: {} {}",
                            encoding, version
                        )));
                    }
                }
                "comment" | "obj_info" => {}
                "element" => {
                    let name = words.next().ok_or_else(|| bad_line(&line))?;
                    in_vertex = name == "vertex";
                    if in_vertex {
                        count = words
                            .next()
                            .and_then(|word| word.parse().ok())
                            .ok_or_else(|| bad_line(&line))?;
                    }
                }
                "property" => {
                    // properties of trailing elements (faces etc.) are not read
                    if !in_vertex {
                        continue;
                    }
                    let ty = words.next().ok_or_else(|| bad_line(&line))?;
                    let name = words.next().ok_or_else(|| bad_line(&line))?;
                    let size = scalar_size(ty).ok_or_else(|| {
                        LoadError::Format(format!("unsupported property type: {}", ty))
                    })?;
                    if matches!(ty, "float" | "float32") {
                        offsets.insert(name.to_string(), stride);
                    } else {
                        log::info!("skipping property: {}", name);
                    }
                    stride += size;
                }
                "end_header" => break,
                other => {
                    return Err(LoadError::Format(format!(
                        "unexpected header section: {}",
                        other
                    )))
                }
            }
        }
        Ok(Self {
            count,
            stride,
            offsets,
        })
    }

    fn require(&self, name: &str) -> Result<usize, LoadError> {
        self.offsets
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::MissingAttribute(name.to_string()))
    }
}

pub(super) fn load(path: &Path, max_sh_degree: usize) -> Result<SplatCloud, LoadError> {
    let mut file = io::BufReader::new(fs::File::open(path)?);
    let header = Header::parse(&mut file)?;

    let pos = [
        header.require("x")?,
        header.require("y")?,
        header.require("z")?,
    ];
    let opacity = header.require("opacity")?;
    // stored order is w, x, y, z
    let rot = [
        header.require("rot_0")?,
        header.require("rot_1")?,
        header.require("rot_2")?,
        header.require("rot_3")?,
    ];
    let scale = [
        header.require("scale_0")?,
        header.require("scale_1")?,
        header.require("scale_2")?,
    ];

    let coeffs = sh_coeff_count(max_sh_degree);
    let mut sh_offsets = Vec::with_capacity(3 * coeffs);
    for channel in 0..3 {
        sh_offsets.push(header.require(&format!("f_dc_{}", channel))?);
    }
    // The file stores the higher bands channel-major; regroup them so the
    // three channel values of each coefficient land adjacently. Downstream
    // shaders index the coefficients that way.
    for band in 0..coeffs - 1 {
        for channel in 0..3 {
            sh_offsets.push(header.require(&format!("f_rest_{}", channel * (coeffs - 1) + band))?);
        }
    }

    log::info!(
        "reading {} vertices with stride {} from {}",
        header.count,
        header.stride,
        path.display()
    );

    let mut positions = Vec::with_capacity(header.count);
    let mut rotations = Vec::with_capacity(header.count);
    let mut scales = Vec::with_capacity(header.count);
    let mut opacities = Vec::with_capacity(header.count);
    let mut sh = Vec::with_capacity(header.count * 3 * coeffs);
    let mut row = vec![0u8; header.stride];
    for _ in 0..header.count {
        file.read_exact(&mut row)?;
        positions.push(Vec3::new(
            read_f32(&row, pos[0]),
            read_f32(&row, pos[1]),
            read_f32(&row, pos[2]),
        ));
        rotations.push(
            Quat::from_xyzw(
                read_f32(&row, rot[1]),
                read_f32(&row, rot[2]),
                read_f32(&row, rot[3]),
                read_f32(&row, rot[0]),
            )
            .normalize(),
        );
        scales.push(
            Vec3::new(
                read_f32(&row, scale[0]),
                read_f32(&row, scale[1]),
                read_f32(&row, scale[2]),
            )
            .exp(),
        );
        opacities.push(sigmoid(read_f32(&row, opacity)));
        sh.extend(sh_offsets.iter().map(|&offset| read_f32(&row, offset)));
    }

    let mut probe = [0u8];
    if file.read(&mut probe)? != 0 {
        log::warn!(
            "trailing bytes after {} vertices in {}",
            header.count,
            path.display()
        );
    }

    Ok(SplatCloud::new(
        positions,
        rotations,
        scales,
        opacities,
        sh,
        3 * coeffs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Header, LoadError> {
        Header::parse(&mut io::Cursor::new(text.as_bytes()))
    }

    #[test]
    fn header_offsets_and_stride() {
        let header = parse(
            "ply\nformat binary_little_endian 1.0\ncomment made up\n\
             element vertex 7\nproperty float x\nproperty uchar red\n\
             property float y\nend_header\n",
        )
        .unwrap();
        assert_eq!(header.count, 7);
        assert_eq!(header.stride, 9);
        assert_eq!(header.require("x").unwrap(), 0);
        assert_eq!(header.require("y").unwrap(), 5);
        assert!(matches!(
            header.require("red"),
            Err(LoadError::MissingAttribute(_))
        ));
    }

    #[test]
    fn header_rejects_wrong_magic() {
        assert!(matches!(parse("plyx\n"), Err(LoadError::Format(_))));
    }

    #[test]
    fn header_rejects_ascii_encoding() {
        assert!(matches!(
            parse("ply\nformat ascii 1.0\nend_header\n"),
            Err(LoadError::Format(_))
        ));
    }

    #[test]
    fn header_rejects_truncation() {
        assert!(matches!(
            parse("ply\nformat binary_little_endian 1.0\n"),
            Err(LoadError::Format(_))
        ));
    }

    #[test]
    fn sigmoid_is_logistic() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }
}
