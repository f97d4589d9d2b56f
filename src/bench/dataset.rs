//! Request corpus: (input length, output length) pairs and synthetic prompts.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RouterError};

/// Word that tokenizes to exactly one token, used to pad prompts
pub const FILLER_WORD: &str = "hi";

/// One row of the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLengths {
    pub input_len: u32,
    pub output_len: u32,
}

/// A request ready to be issued by the benchmark driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticRequest {
    /// Position in issue order
    pub index: usize,
    pub prompt: String,
    pub input_len: u32,
    pub output_len: u32,
}

impl SyntheticRequest {
    pub fn new(index: usize, lengths: RequestLengths) -> Self {
        Self {
            index,
            prompt: build_prompt(lengths.input_len),
            input_len: lengths.input_len,
            output_len: lengths.output_len,
        }
    }
}

/// Prompt of exactly `input_len` filler tokens
pub fn build_prompt(input_len: u32) -> String {
    format!("{} ", FILLER_WORD).repeat(input_len as usize)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    rows: Vec<RequestLengths>,
}

impl Dataset {
    pub fn new(rows: Vec<RequestLengths>) -> Self {
        Self { rows }
    }

    /// Load `input_len,output_len` rows from a CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Dataset(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_csv(&content)
    }

    /// Parse CSV content. A non-numeric first line is treated as a header;
    /// columns past the second are ignored.
    pub fn parse_csv(content: &str) -> Result<Self> {
        let mut rows = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let parsed = match (fields.next(), fields.next()) {
                (Some(input), Some(output)) => input.parse::<u32>().ok().zip(output.parse().ok()),
                _ => None,
            };

            match parsed {
                Some((input_len, output_len)) => rows.push(RequestLengths {
                    input_len,
                    output_len,
                }),
                None if lineno == 0 => continue,
                None => {
                    return Err(RouterError::Dataset(format!(
                        "line {}: expected 'input_len,output_len', got '{}'",
                        lineno + 1,
                        line
                    )))
                }
            }
        }

        Ok(Self { rows })
    }

    /// `n` rows with lengths drawn uniformly from `1..=max_input` / `1..=max_output`
    pub fn synthetic<R: Rng + ?Sized>(
        n: usize,
        max_input: u32,
        max_output: u32,
        rng: &mut R,
    ) -> Self {
        let rows = (0..n)
            .map(|_| RequestLengths {
                input_len: rng.gen_range(1..=max_input.max(1)),
                output_len: rng.gen_range(1..=max_output.max(1)),
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[RequestLengths] {
        &self.rows
    }

    /// Draw `n` distinct rows in random order and build their prompts
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<SyntheticRequest>> {
        if n > self.rows.len() {
            return Err(RouterError::Dataset(format!(
                "cannot sample {} requests from a corpus of {}",
                n,
                self.rows.len()
            )));
        }

        Ok(index::sample(rng, self.rows.len(), n)
            .into_iter()
            .enumerate()
            .map(|(position, row)| SyntheticRequest::new(position, self.rows[row]))
            .collect())
    }
}
