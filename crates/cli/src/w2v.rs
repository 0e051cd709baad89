//! Reader for the word2vec binary format.
//!
//! The file starts with an 8-byte header, followed by records of
//! `[u16 word length][word bytes][300 × f32 little-endian]`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Embedding dimension of the word2vec corpus.
pub const W2V_DIM: usize = 300;

pub struct W2vFile {
    reader: BufReader<File>,
}

impl W2vFile {
    /// Open the file and skip the header.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        Ok(Self { reader })
    }

    /// Read the next `(word, vector)` record, or `None` at end of file.
    pub fn next_entry(&mut self) -> io::Result<Option<(String, Vec<f32>)>> {
        let mut len_buf = [0u8; 2];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let word_len = u16::from_le_bytes(len_buf) as usize;

        let mut word_buf = vec![0u8; word_len];
        self.reader.read_exact(&mut word_buf)?;
        let word = String::from_utf8_lossy(&word_buf).into_owned();

        let mut vec_buf = vec![0u8; W2V_DIM * 4];
        self.reader.read_exact(&mut vec_buf)?;
        let vector: Vec<f32> = vec_buf
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Some((word, vector)))
    }
}
