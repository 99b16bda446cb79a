use crate::candidate::Candidate;
use crate::config::{GeneratorSettings, WordlistSettings};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or draining a candidate source.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The wordlist could not be opened. Nothing is generated in this case.
    #[error("Wordlist {path:?} is unavailable: {source}")]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the wordlist could not be read after the file was opened.
    #[error("Failed to read wordlist {path:?} at line {line}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// The exhaustive alphabet must be an ordered set.
    #[error("Alphabet contains duplicate character {0:?}")]
    InvalidAlphabet(char),
}

/// Lazy, forward-only stream of candidates.
pub type CandidateStream = Box<dyn Iterator<Item = Result<Candidate, GeneratorError>>>;

/// A deterministic producer of candidates.
///
/// Every call to [`CandidateSource::candidates`] starts again from the
/// beginning and yields the identical sequence. Sources keep no memory of
/// earlier runs; resumption relies on the checkpoint skipping what was
/// already tried.
pub trait CandidateSource {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Opens a fresh stream positioned at the first candidate.
    fn candidates(&self) -> Result<CandidateStream, GeneratorError>;

    /// Total number of candidates the stream yields, when cheap to know.
    fn size_hint_total(&self) -> Option<u128> {
        None
    }
}

/// Builds the source described by `settings`.
pub fn source_from_settings(
    settings: &GeneratorSettings,
) -> Result<Box<dyn CandidateSource>, GeneratorError> {
    match settings {
        GeneratorSettings::Wordlist(wordlist) => {
            Ok(Box::new(WordlistSource::new(wordlist.clone())))
        }
        GeneratorSettings::Exhaustive(exhaustive) => Ok(Box::new(ExhaustiveSource::new(
            &exhaustive.alphabet,
            exhaustive.max_length,
        )?)),
    }
}

/// Reads a line-oriented wordlist and derives candidates from lines that pass
/// the marker filter.
///
/// A passing line has its trailing whitespace removed and produces one
/// candidate per configured suffix, in suffix order. Lines are visited in file
/// order.
#[derive(Debug, Clone)]
pub struct WordlistSource {
    settings: WordlistSettings,
}

impl WordlistSource {
    pub fn new(settings: WordlistSettings) -> Self {
        Self { settings }
    }

    fn accepts(marker: Option<&str>, line: &str) -> bool {
        marker.is_none_or(|m| line.starts_with(m))
    }
}

impl CandidateSource for WordlistSource {
    fn name(&self) -> &'static str {
        "wordlist"
    }

    fn candidates(&self) -> Result<CandidateStream, GeneratorError> {
        let path = self.settings.path.clone();
        let file = File::open(&path).map_err(|source| GeneratorError::ResourceUnavailable {
            path: path.clone(),
            source,
        })?;

        let suffixes = if self.settings.suffixes.is_empty() {
            vec![String::new()]
        } else {
            self.settings.suffixes.clone()
        };

        Ok(Box::new(WordlistIter {
            lines: BufReader::new(file).lines(),
            path,
            marker: self.settings.marker.clone(),
            suffixes,
            pending: VecDeque::new(),
            line_number: 0,
            failed: false,
        }))
    }
}

struct WordlistIter {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    marker: Option<String>,
    suffixes: Vec<String>,
    pending: VecDeque<Candidate>,
    line_number: usize,
    failed: bool,
}

impl Iterator for WordlistIter {
    type Item = Result<Candidate, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some(Ok(candidate));
            }
            if self.failed {
                return None;
            }

            self.line_number += 1;
            match self.lines.next()? {
                Ok(line) => {
                    if !WordlistSource::accepts(self.marker.as_deref(), &line) {
                        continue;
                    }
                    let stem = line.trim_end();
                    self.pending.extend(
                        self.suffixes
                            .iter()
                            .map(|suffix| Candidate::new(format!("{stem}{suffix}"))),
                    );
                }
                Err(source) => {
                    // Stop after the first read error; the search treats it as fatal.
                    self.failed = true;
                    return Some(Err(GeneratorError::Read {
                        path: self.path.clone(),
                        line: self.line_number,
                        source,
                    }));
                }
            }
        }
    }
}

/// Enumerates every string over an alphabet, shortest first.
///
/// Yields the empty string, then all strings of length 1, then length 2, up to
/// `max_length`. Within one length the order is the lexicographic product
/// order induced by the alphabet's character order.
#[derive(Debug, Clone)]
pub struct ExhaustiveSource {
    alphabet: Vec<char>,
    max_length: usize,
}

impl ExhaustiveSource {
    pub fn new(alphabet: &str, max_length: usize) -> Result<Self, GeneratorError> {
        let mut seen = HashSet::new();
        let mut chars = Vec::new();
        for ch in alphabet.chars() {
            if !seen.insert(ch) {
                return Err(GeneratorError::InvalidAlphabet(ch));
            }
            chars.push(ch);
        }
        Ok(Self {
            alphabet: chars,
            max_length,
        })
    }

    /// `sum(|alphabet|^L for L in 0..=max_length)`, or `None` on overflow.
    pub fn total(&self) -> Option<u128> {
        let base = self.alphabet.len() as u128;
        let mut total: u128 = 0;
        let mut per_length: u128 = 1;
        for length in 0..=self.max_length {
            if length > 0 {
                per_length = per_length.checked_mul(base)?;
            }
            total = total.checked_add(per_length)?;
        }
        Some(total)
    }
}

impl CandidateSource for ExhaustiveSource {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn candidates(&self) -> Result<CandidateStream, GeneratorError> {
        Ok(Box::new(ExhaustiveIter {
            alphabet: self.alphabet.clone(),
            max_length: self.max_length,
            digits: Vec::new(),
            done: false,
        }))
    }

    fn size_hint_total(&self) -> Option<u128> {
        self.total()
    }
}

/// Odometer over alphabet indices; `digits.len()` is the current length.
struct ExhaustiveIter {
    alphabet: Vec<char>,
    max_length: usize,
    digits: Vec<usize>,
    done: bool,
}

impl ExhaustiveIter {
    fn advance(&mut self) {
        for pos in (0..self.digits.len()).rev() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.alphabet.len() {
                return;
            }
            self.digits[pos] = 0;
        }

        let next_length = self.digits.len() + 1;
        if next_length > self.max_length || self.alphabet.is_empty() {
            self.done = true;
        } else {
            self.digits = vec![0; next_length];
        }
    }
}

impl Iterator for ExhaustiveIter {
    type Item = Result<Candidate, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current: String = self.digits.iter().map(|&i| self.alphabet[i]).collect();
        self.advance();
        Some(Ok(Candidate::new(current)))
    }
}
