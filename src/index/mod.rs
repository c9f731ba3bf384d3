//! Exact inner-product similarity index.
//!
//! Vectors are stored contiguously in insertion order together with the id
//! of the corpus entry each one was built from. Search is a full scan,
//! which is exact and fast enough for corpora of a few thousand entries.
//!
//! On-disk layout (little endian):
//!
//! ```text
//! magic "QAIX" | version u32 | dimension u32 | count u64
//! count x ( entry id [u8; 16] | dimension x f32 )
//! ```


use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::{LookupError, Result};

const MAGIC: &[u8; 4] = b"QAIX";
const FORMAT_VERSION: u32 = 1;

/// A search hit: the corpus position of a vector and its inner product
/// with the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<Uuid>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entry ids in vector order
    #[inline]
    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Append vectors in the given order. Nothing is added unless every
    /// vector has the index dimension and only finite components.
    #[inline]
    pub fn add_batch(&mut self, ids: &[Uuid], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(LookupError::Index(format!(
                "Cannot add {} vectors with {} ids",
                vectors.len(),
                ids.len()
            )));
        }

        if self.dimension == 0 && !vectors.is_empty() {
            return Err(LookupError::Index(
                "Cannot add vectors to a zero-dimensional index".into(),
            ));
        }

        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(LookupError::Index(format!(
                "Vector {} has {} dimensions, index expects {}",
                position,
                vector.len(),
                self.dimension
            )));
        }

        if let Some(position) = vectors
            .iter()
            .position(|v| v.iter().any(|x| !x.is_finite()))
        {
            return Err(LookupError::Index(format!(
                "Vector {} has non-finite components",
                position
            )));
        }

        self.ids.extend_from_slice(ids);
        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        Ok(())
    }

    /// Exact k-nearest-neighbor search by inner product.
    ///
    /// Returns at most `k` neighbors ordered by descending score; equal
    /// scores keep insertion order.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(LookupError::Index(format!(
                "Query has {} dimensions, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                score: dot(query, vector),
            })
            .collect();

        neighbors.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Build a transient index over the given positions.
    ///
    /// Position `i` of the result is `positions[i]` of `self`.
    #[inline]
    pub fn subset(&self, positions: &[usize]) -> Result<Self> {
        let mut subset = Self::new(self.dimension);
        subset.ids.reserve(positions.len());
        subset.vectors.reserve(positions.len() * self.dimension);

        for &position in positions {
            let vector = self.vector(position).ok_or_else(|| {
                LookupError::Index(format!(
                    "Position {} is out of range for an index of {} vectors",
                    position,
                    self.len()
                ))
            })?;
            subset.ids.push(self.ids[position]);
            subset.vectors.extend_from_slice(vector);
        }

        Ok(subset)
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        debug!(
            "Wrote index with {} vectors to {}",
            self.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let index = Self::read_from(&mut BufReader::new(file))?;
        debug!(
            "Loaded index with {} vectors of dimension {} from {}",
            index.len(),
            index.dimension,
            path.as_ref().display()
        );
        Ok(index)
    }

    #[inline]
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let dimension = u32::try_from(self.dimension)
            .map_err(|_| LookupError::Index("Dimension does not fit the index format".into()))?;

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&dimension.to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;

        for position in 0..self.len() {
            writer.write_all(self.ids[position].as_bytes())?;
            let start = position * self.dimension;
            for value in &self.vectors[start..start + self.dimension] {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        Ok(())
    }

    #[inline]
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic, "header")?;
        if &magic != MAGIC {
            return Err(LookupError::Index("Invalid magic number".into()));
        }

        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];

        read_exact(reader, &mut buf4, "header")?;
        let version = u32::from_le_bytes(buf4);
        if version != FORMAT_VERSION {
            return Err(LookupError::Index(format!(
                "Unsupported index format version: {}",
                version
            )));
        }

        read_exact(reader, &mut buf4, "header")?;
        let dimension = u32::from_le_bytes(buf4) as usize;

        read_exact(reader, &mut buf8, "header")?;
        let count = usize::try_from(u64::from_le_bytes(buf8))
            .map_err(|_| LookupError::Index("Vector count does not fit in memory".into()))?;

        if dimension == 0 && count > 0 {
            return Err(LookupError::Index(
                "Index declares vectors with zero dimensions".into(),
            ));
        }

        let mut index = Self::new(dimension);
        let mut id_buf = [0u8; 16];

        for _ in 0..count {
            read_exact(reader, &mut id_buf, "entry id")?;
            index.ids.push(Uuid::from_bytes(id_buf));

            for _ in 0..dimension {
                read_exact(reader, &mut buf4, "vector data")?;
                let value = f32::from_le_bytes(buf4);
                if !value.is_finite() {
                    return Err(LookupError::Index(format!(
                        "Vector {} has non-finite components",
                        index.ids.len() - 1
                    )));
                }
                index.vectors.push(value);
            }
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(LookupError::Index(
                "Unexpected trailing data after last vector".into(),
            ));
        }

        Ok(index)
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            LookupError::Index(format!("Index file is truncated while reading {}", what))
        } else {
            LookupError::Io(e)
        }
    })
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
