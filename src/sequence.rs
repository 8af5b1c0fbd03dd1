//! Validated batches of equal-length sequences.
use crate::error::{Result, SequenceFault, TssError};
use crate::{Alphabet, Code};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// An ordered batch of sequences sharing one alphabet and one length.
///
/// Sequences are stored as residue codes in a dense `(sequences, length)` array. The
/// length is kept even when the batch is empty, so an empty binder table still knows
/// how many positions it has.
#[derive(Debug, Clone)]
pub struct SequenceSet {
    alphabet: Alphabet,
    labels: Vec<String>,
    codes: Array2<Code>,
}

impl SequenceSet {
    /// Encodes `sequences`, requiring each to be exactly `length` symbols of `alphabet`.
    ///
    /// Each sequence is labeled with its own string.
    pub fn new<I, S>(alphabet: &Alphabet, length: usize, sequences: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if length == 0 {
            return Err(TssError::InvalidParameter(
                "sequence length must be positive".into(),
            ));
        }
        let mut labels = vec![];
        let mut codes = vec![];
        for (idx, seq) in sequences.into_iter().enumerate() {
            let seq = seq.as_ref();
            encode(alphabet, idx, length, seq, &mut codes)?;
            labels.push(seq.to_owned());
        }
        Self::from_parts(alphabet, length, labels, codes)
    }

    /// Like [`new`](Self::new), taking the length from the first sequence.
    pub fn from_strs<S: AsRef<str>>(alphabet: &Alphabet, sequences: &[S]) -> Result<Self> {
        let length = match sequences.first() {
            Some(first) => first.as_ref().chars().count(),
            None => {
                return Err(TssError::InvalidParameter(
                    "cannot infer a sequence length from an empty batch".into(),
                ))
            }
        };
        Self::new(alphabet, length, sequences)
    }

    /// A batch with no sequences but a known length.
    pub fn empty(alphabet: &Alphabet, length: usize) -> Result<Self> {
        Self::new(alphabet, length, Vec::<String>::new())
    }

    pub(crate) fn from_parts(
        alphabet: &Alphabet,
        length: usize,
        labels: Vec<String>,
        codes: Vec<Code>,
    ) -> Result<Self> {
        let codes = Array2::from_shape_vec((labels.len(), length), codes)
            .map_err(|e| TssError::InvalidParameter(e.to_string()))?;
        Ok(Self {
            alphabet: alphabet.clone(),
            labels,
            codes,
        })
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length shared by every sequence.
    pub fn length(&self) -> usize {
        self.codes.ncols()
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn codes(&self) -> ArrayView2<'_, Code> {
        self.codes.view()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, Code> {
        self.codes.row(index)
    }

    /// Decodes one sequence back into symbols.
    pub fn sequence(&self, index: usize) -> String {
        self.codes
            .row(index)
            .iter()
            .map(|&c| self.alphabet.symbol(c))
            .collect()
    }

    /// Checks this batch can be used against `alphabet` and `length`.
    pub(crate) fn ensure_compatible(&self, alphabet: &Alphabet, length: usize) -> Result<()> {
        if &self.alphabet != alphabet {
            return Err(TssError::InvalidSequence {
                sequence: 0,
                position: 0,
                fault: SequenceFault::Alphabet,
            });
        }
        if self.length() != length {
            return Err(TssError::length(0, length, self.length()));
        }
        Ok(())
    }
}

/// Appends the codes of `seq` to `out`, or reports the first fault.
///
/// Length is checked before any symbol so a short or long sequence never gets
/// partially encoded.
pub(crate) fn encode(
    alphabet: &Alphabet,
    index: usize,
    length: usize,
    seq: &str,
    out: &mut Vec<Code>,
) -> Result<()> {
    let actual = seq.chars().count();
    if actual != length {
        return Err(TssError::length(index, length, actual));
    }
    let start = out.len();
    for (pos, c) in seq.chars().enumerate() {
        match alphabet.code(c) {
            Some(code) => out.push(code),
            None => {
                out.truncate(start);
                return Err(TssError::symbol(index, pos, c));
            }
        }
    }
    Ok(())
}
