//! Vertex and index buffer layouts

use bytemuck::{Pod, Zeroable};

/// What a vertex element carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    /// Texture coordinate set, `TexCoord(0)` is the primary UV channel
    TexCoord(u8),
    Tangent,
    Color,
}

/// Element storage format. Only 32-bit float formats are produced or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// Number of `f32` components
    pub fn components(self) -> usize {
        match self {
            VertexFormat::Float32x2 => 2,
            VertexFormat::Float32x3 => 3,
            VertexFormat::Float32x4 => 4,
        }
    }

    /// Size in bytes
    pub fn size(self) -> u32 {
        (self.components() * std::mem::size_of::<f32>()) as u32
    }
}

/// One attribute inside an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    /// Byte offset from the start of the vertex
    pub offset: u32,
}

/// Interleaved vertex layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    pub elements: Vec<VertexElement>,
}

impl VertexLayout {
    /// Build a tightly packed layout, elements placed in the given order
    pub fn packed(elements: &[(VertexSemantic, VertexFormat)]) -> Self {
        let mut offset = 0u32;
        let elements = elements
            .iter()
            .map(|&(semantic, format)| {
                let element = VertexElement {
                    semantic,
                    format,
                    offset,
                };
                offset += format.size();
                element
            })
            .collect();
        Self {
            stride: offset,
            elements,
        }
    }

    /// Find the element carrying `semantic`
    pub fn find(&self, semantic: VertexSemantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }

    /// Check that every element fits inside the stride
    pub fn is_valid(&self) -> bool {
        self.stride > 0
            && self
                .elements
                .iter()
                .all(|e| {
                    e.offset
                        .checked_add(e.format.size())
                        .is_some_and(|end| end <= self.stride)
                })
    }
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes
    pub fn size(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    /// Smallest index count that no longer fits a 16-bit buffer
    pub const U16_LIMIT: usize = 65536;

    /// Width required for `index_count` indices
    pub fn for_index_count(index_count: usize) -> Self {
        if index_count < Self::U16_LIMIT {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        }
    }
}

/// Position / normal / texture coordinate vertex
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPositionNormalTexture {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl VertexPositionNormalTexture {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Vertex buffer layout descriptor
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(&[
            (VertexSemantic::Position, VertexFormat::Float32x3),
            (VertexSemantic::Normal, VertexFormat::Float32x3),
            (VertexSemantic::TexCoord(0), VertexFormat::Float32x2),
        ])
    }
}

/// Position / normal / tangent / texture coordinate vertex
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPositionNormalTangentTexture {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

impl VertexPositionNormalTangentTexture {
    /// Vertex buffer layout descriptor
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(&[
            (VertexSemantic::Position, VertexFormat::Float32x3),
            (VertexSemantic::Normal, VertexFormat::Float32x3),
            (VertexSemantic::Tangent, VertexFormat::Float32x4),
            (VertexSemantic::TexCoord(0), VertexFormat::Float32x2),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_layout_matches_struct() {
        let layout = VertexPositionNormalTexture::layout();
        assert_eq!(
            layout.stride as usize,
            std::mem::size_of::<VertexPositionNormalTexture>()
        );
        assert_eq!(layout.find(VertexSemantic::Normal).unwrap().offset, 12);
        assert_eq!(layout.find(VertexSemantic::TexCoord(0)).unwrap().offset, 24);
        assert!(layout.find(VertexSemantic::Tangent).is_none());
        assert!(layout.is_valid());

        let layout = VertexPositionNormalTangentTexture::layout();
        assert_eq!(
            layout.stride as usize,
            std::mem::size_of::<VertexPositionNormalTangentTexture>()
        );
        assert_eq!(layout.find(VertexSemantic::Tangent).unwrap().offset, 24);
    }

    #[test]
    fn test_element_outside_stride() {
        let mut layout = VertexLayout::packed(&[(VertexSemantic::Position, VertexFormat::Float32x3)]);
        layout.elements[0].offset = 8;
        assert!(!layout.is_valid());
        layout.elements[0].offset = u32::MAX - 4;
        assert!(!layout.is_valid());
    }

    #[test]
    fn test_index_format_threshold() {
        assert_eq!(IndexFormat::for_index_count(0), IndexFormat::U16);
        assert_eq!(IndexFormat::for_index_count(65535), IndexFormat::U16);
        assert_eq!(IndexFormat::for_index_count(65536), IndexFormat::U32);
        assert_eq!(IndexFormat::for_index_count(90_000), IndexFormat::U32);
    }
}
