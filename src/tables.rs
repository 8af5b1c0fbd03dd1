//! CSV layouts read and written by a scoring run.
//!
//! Every table has a header row and may carry a leading index column, recognised by an
//! empty first header cell (or `Unnamed: 0`, as written by pandas).
use crate::error::{Result, TssError};
use crate::regression::{Phenotypes, RegressionSummary};
use crate::scorer::TssTable;
use crate::sequence::SequenceSet;
use crate::{Alphabet, ClusterSet, Code};
use ndarray::Array2;
use std::io::{Read, Write};

/// Whether the first column of a table holds row labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexColumn {
    /// Decide from the first header cell.
    Detect,
    Present,
    Absent,
}

/// Reads the tabular inputs of a run.
///
/// `TableReader::new()` gives comma-separated input with index detection; use the
/// setters to change either before calling one of the readers.
#[derive(Debug, Clone)]
pub struct TableReader {
    delimiter: u8,
    index_column: IndexColumn,
}

impl Default for TableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableReader {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            index_column: IndexColumn::Detect,
        }
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    pub fn index_column(&mut self, index_column: IndexColumn) -> &mut Self {
        self.index_column = index_column;
        self
    }

    fn open<R: Read>(
        &self,
        reader: R,
        flexible: bool,
    ) -> Result<(csv::Reader<R>, Vec<String>, bool)> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(flexible)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_owned()).collect();
        let indexed = match self.index_column {
            IndexColumn::Present => true,
            IndexColumn::Absent => false,
            IndexColumn::Detect => headers
                .first()
                .map_or(false, |h| h.is_empty() || h == "Unnamed: 0"),
        };
        Ok((rdr, headers, indexed))
    }

    /// Reads a peptide or binder table: one single-residue column per position.
    ///
    /// The sequence length is the number of position columns, so a table with a header
    /// and no rows yields an empty set of known length.
    pub fn sequences<R: Read>(&self, reader: R, alphabet: &Alphabet) -> Result<SequenceSet> {
        let (mut rdr, headers, indexed) = self.open(reader, true)?;
        let skip = indexed as usize;
        let length = headers.len().saturating_sub(skip);
        if length == 0 {
            return Err(TssError::Table("sequence table has no position columns".into()));
        }
        let mut labels = vec![];
        let mut codes: Vec<Code> = vec![];
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let actual = record.len().saturating_sub(skip);
            if actual != length {
                return Err(TssError::length(row, length, actual));
            }
            let mut label = String::with_capacity(length);
            for (pos, cell) in record.iter().skip(skip).enumerate() {
                let mut chars = cell.chars();
                let c = match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(TssError::Table(format!(
                            "row {} position {}: {:?} is not a single residue",
                            row, pos, cell
                        )))
                    }
                };
                codes.push(alphabet.code(c).ok_or_else(|| TssError::symbol(row, pos, c))?);
                label.push(c);
            }
            labels.push(label);
        }
        SequenceSet::from_parts(alphabet, length, labels, codes)
    }

    /// Reads a TSS table indexed by peptide, taking one column per cluster tag.
    ///
    /// Columns are matched by header; extra columns are ignored.
    pub fn tss<R: Read>(&self, reader: R, clusters: &ClusterSet) -> Result<TssTable> {
        let (mut rdr, headers, indexed) = self.open(reader, false)?;
        if !indexed {
            return Err(TssError::Table(
                "TSS table needs a leading peptide index column".into(),
            ));
        }
        let columns = clusters
            .tags()
            .iter()
            .map(|tag| {
                headers
                    .iter()
                    .skip(1)
                    .position(|h| h == tag)
                    .map(|i| i + 1)
                    .ok_or_else(|| TssError::Table(format!("TSS table has no column {:?}", tag)))
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut labels = vec![];
        let mut values = vec![];
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            labels.push(record.get(0).unwrap_or_default().to_owned());
            for &col in &columns {
                values.push(parse_cell(record.get(col), row, &headers[col])?);
            }
        }
        let scores = Array2::from_shape_vec((labels.len(), clusters.len()), values)
            .map_err(|e| TssError::Table(e.to_string()))?;
        TssTable::new(labels, clusters.clone(), scores)
    }

    /// Reads a phenotype table.
    ///
    /// Ids come from `id_column` when given, otherwise from the index column if there
    /// is one; without either, rows are aligned by order.
    pub fn phenotypes<R: Read>(
        &self,
        reader: R,
        id_column: Option<&str>,
        value_column: &str,
    ) -> Result<Phenotypes> {
        let (mut rdr, headers, indexed) = self.open(reader, false)?;
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| TssError::Table(format!("phenotype table has no column {:?}", name)))
        };
        let value_col = find(value_column)?;
        let id_col = match id_column {
            Some(name) => Some(find(name)?),
            None if indexed => Some(0),
            None => None,
        };

        let mut ids = vec![];
        let mut values = vec![];
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            if let Some(col) = id_col {
                ids.push(record.get(col).unwrap_or_default().to_owned());
            }
            values.push(parse_cell(record.get(value_col), row, value_column)?);
        }
        match id_col {
            Some(_) => Phenotypes::with_ids(ids, values),
            None => Ok(Phenotypes::new(values)),
        }
    }

    /// Reads one substitution matrix laid out as an alphabet-labelled grid.
    ///
    /// Rows and columns are matched by label; labels outside the alphabet are ignored.
    pub fn matrix<R: Read>(
        &self,
        reader: R,
        tag: &str,
        alphabet: &Alphabet,
    ) -> Result<Array2<f64>> {
        let (mut rdr, headers, _) = self
            .open(reader, false)
            .map_err(|e| TssError::matrix(tag, e.to_string()))?;
        let n = alphabet.len();
        let mut col_of = vec![None; n];
        for (i, h) in headers.iter().enumerate().skip(1) {
            if let Some(code) = single_code(h, alphabet) {
                col_of[code as usize] = Some(i);
            }
        }
        if let Some(missing) = col_of.iter().position(Option::is_none) {
            return Err(TssError::matrix(
                tag,
                format!("no column for {}", alphabet.symbol(missing as Code)),
            ));
        }

        let mut grid = Array2::from_elem((n, n), f64::NAN);
        let mut seen = vec![false; n];
        for record in rdr.records() {
            let record = record.map_err(|e| TssError::matrix(tag, e.to_string()))?;
            let a = match record.get(0).and_then(|label| single_code(label, alphabet)) {
                Some(a) => a,
                None => continue,
            };
            if std::mem::replace(&mut seen[a as usize], true) {
                return Err(TssError::matrix(
                    tag,
                    format!("row {} appears twice", alphabet.symbol(a)),
                ));
            }
            for (b, col) in col_of.iter().enumerate() {
                let cell = col.and_then(|i| record.get(i)).unwrap_or_default();
                let score = cell.parse::<f64>().ok().filter(|v| v.is_finite());
                grid[[a as usize, b]] = score.ok_or_else(|| {
                    TssError::matrix(
                        tag,
                        format!(
                            "no score for ({}, {}): {:?}",
                            alphabet.symbol(a),
                            alphabet.symbol(b as Code),
                            cell
                        ),
                    )
                })?;
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(TssError::matrix(
                tag,
                format!("no row for {}", alphabet.symbol(missing as Code)),
            ));
        }
        Ok(grid)
    }
}

fn single_code(label: &str, alphabet: &Alphabet) -> Option<Code> {
    let mut chars = label.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => alphabet.code(c),
        _ => None,
    }
}

fn parse_cell(cell: Option<&str>, row: usize, column: &str) -> Result<f64> {
    let cell = cell.unwrap_or_default();
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TssError::Table(format!(
            "row {} column {:?}: {:?} is not a finite number",
            row, column, cell
        ))),
    }
}

pub fn read_sequences<R: Read>(reader: R, alphabet: &Alphabet) -> Result<SequenceSet> {
    TableReader::new().sequences(reader, alphabet)
}

pub fn read_tss<R: Read>(reader: R, clusters: &ClusterSet) -> Result<TssTable> {
    TableReader::new().tss(reader, clusters)
}

pub fn read_phenotypes<R: Read>(
    reader: R,
    id_column: Option<&str>,
    value_column: &str,
) -> Result<Phenotypes> {
    TableReader::new().phenotypes(reader, id_column, value_column)
}

pub fn read_matrix<R: Read>(reader: R, tag: &str, alphabet: &Alphabet) -> Result<Array2<f64>> {
    TableReader::new().matrix(reader, tag, alphabet)
}

/// Writes a TSS table: peptide index, then one column per cluster in cluster order.
pub fn write_tss<W: Write>(writer: W, tss: &TssTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![String::new()];
    header.extend(tss.clusters().tags().iter().cloned());
    wtr.write_record(&header)?;
    for record in tss.records() {
        let mut row = vec![record.label().to_owned()];
        row.extend(record.values().iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes observed and predicted phenotypes, indexed by peptide.
pub fn write_predictions<W: Write>(writer: W, summary: &RegressionSummary) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&["", "observed", "predicted"])?;
    for (label, observed, predicted) in summary.predictions() {
        wtr.write_record(&[label.to_owned(), observed.to_string(), predicted.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceFault;
    use ndarray::array;
    use std::error::Error;

    #[test]
    fn test_sequence_table_with_index() -> Result<(), Box<dyn Error>> {
        let data = ",0,1,2\n0,A,I,Y\n1,D,T,M\n";
        let set = read_sequences(data.as_bytes(), &Alphabet::amino_acids())?;
        assert_eq!(set.length(), 3);
        assert_eq!(set.labels(), &["AIY".to_string(), "DTM".to_string()]);
        Ok(())
    }

    #[test]
    fn test_sequence_table_without_index() -> Result<(), Box<dyn Error>> {
        let data = "0,1\nA,C\nC,C\n";
        let set = read_sequences(data.as_bytes(), &Alphabet::new("AC")?)?;
        assert_eq!(set.len(), 2);
        assert_eq!(set.sequence(0), "AC");
        Ok(())
    }

    #[test]
    fn test_empty_sequence_table_keeps_columns() -> Result<(), Box<dyn Error>> {
        let set = read_sequences("0,1,2,3\n".as_bytes(), &Alphabet::amino_acids())?;
        assert!(set.is_empty());
        assert_eq!(set.length(), 4);
        Ok(())
    }

    #[test]
    fn test_bad_residue_in_table() {
        let err =
            read_sequences("0,1\nA,C\nA,B\n".as_bytes(), &Alphabet::amino_acids()).unwrap_err();
        match err {
            TssError::InvalidSequence {
                sequence,
                position,
                fault,
            } => {
                assert_eq!((sequence, position), (1, 1));
                assert_eq!(fault, SequenceFault::Symbol('B'));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            read_sequences("0,1\nA,CC\n".as_bytes(), &Alphabet::amino_acids()),
            Err(TssError::Table(_))
        ));
    }

    #[test]
    fn test_short_row_names_sequence_and_position() {
        let data = ",0,1,2\n0,A,C,D\n1,A,C\n";
        let err = read_sequences(data.as_bytes(), &Alphabet::amino_acids()).unwrap_err();
        match err {
            TssError::InvalidSequence {
                sequence,
                position,
                fault,
            } => {
                assert_eq!((sequence, position), (1, 2));
                assert_eq!(
                    fault,
                    SequenceFault::Length {
                        expected: 3,
                        actual: 2
                    }
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            read_sequences("0,1\nA,C,D\n".as_bytes(), &Alphabet::amino_acids()),
            Err(TssError::InvalidSequence { sequence: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_cells_rejected() -> Result<(), Box<dyn Error>> {
        let clusters = ClusterSet::new(vec!["a"])?;
        for cell in ["NaN", "nan", "inf", "-inf"] {
            let tss = format!(",a\nP0,1\nP1,{}\n", cell);
            assert!(matches!(
                read_tss(tss.as_bytes(), &clusters),
                Err(TssError::Table(_))
            ));
            let phenotypes = format!(",Survive3\nP0,1\nP1,{}\n", cell);
            assert!(matches!(
                read_phenotypes(phenotypes.as_bytes(), None, "Survive3"),
                Err(TssError::Table(_))
            ));
        }
        let matrix = read_matrix(",A\nA,NaN\n".as_bytes(), "a", &Alphabet::new("A")?);
        assert!(matches!(matrix, Err(TssError::MatrixLoad { .. })));
        Ok(())
    }

    #[test]
    fn test_tss_round_trip() -> Result<(), Box<dyn Error>> {
        let clusters = ClusterSet::new(vec!["a", "b"])?;
        let tss = TssTable::new(
            vec!["AC".into(), "CA".into()],
            clusters.clone(),
            array![[3.0, 0.125], [-1.5, 1e-7]],
        )?;
        let mut buf = vec![];
        write_tss(&mut buf, &tss)?;
        assert!(String::from_utf8(buf.clone())?.starts_with(",a,b\nAC,3,0.125\n"));
        let back = read_tss(buf.as_slice(), &clusters)?;
        assert_eq!(back.labels(), tss.labels());
        assert_eq!(back.scores(), tss.scores());
        Ok(())
    }

    #[test]
    fn test_tss_columns_matched_by_name() -> Result<(), Box<dyn Error>> {
        let clusters = ClusterSet::new(vec!["a", "b"])?;
        let data = "Unnamed: 0,b,x,a\nAIIDYIAYM,641,0,574\n";
        let tss = read_tss(data.as_bytes(), &clusters)?;
        assert_eq!(tss.record(0).values().to_vec(), vec![574.0, 641.0]);
        let missing = read_tss(",a\nAC,1\n".as_bytes(), &clusters);
        assert!(matches!(missing, Err(TssError::Table(_))));
        Ok(())
    }

    #[test]
    fn test_phenotypes_by_id_column() -> Result<(), Box<dyn Error>> {
        let data = ",AA_seq,Survive3 \n0,AC,4\n1,CA,7.5\n";
        let p = read_phenotypes(data.as_bytes(), Some("AA_seq"), "Survive3")?;
        assert_eq!(p.ids(), Some(&["AC".to_string(), "CA".to_string()][..]));
        assert_eq!(p.values(), &[4.0, 7.5]);
        let by_index = read_phenotypes(data.as_bytes(), None, "Survive3")?;
        assert_eq!(by_index.ids(), Some(&["0".to_string(), "1".to_string()][..]));
        let by_order = read_phenotypes("y\n1\n2\n".as_bytes(), None, "y")?;
        assert_eq!(by_order.ids(), None);
        Ok(())
    }

    #[test]
    fn test_matrix_missing_pair() -> Result<(), Box<dyn Error>> {
        let alphabet = Alphabet::new("AC")?;
        let ok = read_matrix(",A,C,X\nA,1,0,9\nC,0,1,9\nX,9,9,9\n".as_bytes(), "a", &alphabet)?;
        assert_eq!(ok, array![[1.0, 0.0], [0.0, 1.0]]);

        let err = read_matrix(",A,C\nA,1,\nC,0,1\n".as_bytes(), "a", &alphabet).unwrap_err();
        match err {
            TssError::MatrixLoad { cluster, reason } => {
                assert_eq!(cluster, "a");
                assert!(reason.contains("(A, C)"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            read_matrix(",A\nA,1\nC,0\n".as_bytes(), "a", &alphabet),
            Err(TssError::MatrixLoad { .. })
        ));
        assert!(matches!(
            read_matrix(",A,C\nA,1,0\n".as_bytes(), "a", &alphabet),
            Err(TssError::MatrixLoad { .. })
        ));

        let repeated = ",A,C\nA,1,0\nC,0,1\nA,5,5\n";
        match read_matrix(repeated.as_bytes(), "a", &alphabet).unwrap_err() {
            TssError::MatrixLoad { reason, .. } => assert!(reason.contains("twice")),
            other => panic!("unexpected error {:?}", other),
        }
        Ok(())
    }
}
