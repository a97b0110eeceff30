//! Column reconciliation against a fixed list of required names.

use tracing::debug;

use crate::spec::{ConvertError, EnumCellValue, SpecRecordSet};

/// How a required column was sourced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumColumnMatch {
    /// Source header equal to the required name.
    Exact(usize),
    /// First source header containing the required name, apostrophes ignored.
    Contains(usize),
    /// No candidate; filled with empty strings.
    Missing,
}

fn strip_apostrophes(value: &str) -> String {
    value.replace('\'', "")
}

/// Pick the source column for one required name.
///
/// Exact equality first, then the first header whose apostrophe-free form
/// contains the apostrophe-free required name. Whitespace is significant.
pub fn match_column(headers: &[String], required: &str) -> EnumColumnMatch {
    if let Some(n_idx) = headers.iter().position(|c_header| c_header == required) {
        return EnumColumnMatch::Exact(n_idx);
    }
    let c_required = strip_apostrophes(required);
    match headers
        .iter()
        .position(|c_header| strip_apostrophes(c_header).contains(&c_required))
    {
        Some(n_idx) => EnumColumnMatch::Contains(n_idx),
        None => EnumColumnMatch::Missing,
    }
}

/// Build a record set holding exactly `required`, in that order.
///
/// Row count and order follow the source. The same source column may feed more
/// than one required column.
pub fn reconcile_columns(
    records: &SpecRecordSet,
    required: &[&str],
) -> Result<SpecRecordSet, ConvertError> {
    let l_matches: Vec<EnumColumnMatch> = required
        .iter()
        .map(|c_required| match_column(records.columns(), c_required))
        .collect();

    for (c_required, col_match) in required.iter().zip(&l_matches) {
        match col_match {
            EnumColumnMatch::Exact(_) => {}
            EnumColumnMatch::Contains(n_idx) => debug!(
                column = c_required,
                source = %records.columns()[*n_idx],
                "column matched by containment"
            ),
            EnumColumnMatch::Missing => debug!(column = c_required, "column missing, filled empty"),
        }
    }

    let l_rows = records
        .rows()
        .iter()
        .map(|row| {
            l_matches
                .iter()
                .map(|col_match| match col_match {
                    EnumColumnMatch::Exact(n_idx) | EnumColumnMatch::Contains(n_idx) => {
                        row[*n_idx].clone()
                    }
                    EnumColumnMatch::Missing => EnumCellValue::empty(),
                })
                .collect()
        })
        .collect();

    SpecRecordSet::try_new(required.iter().map(|c| c.to_string()).collect(), l_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_exact_match_wins_over_containment() {
        let l_headers = headers(&["P. Iva old", "P. Iva"]);
        assert_eq!(match_column(&l_headers, "P. Iva"), EnumColumnMatch::Exact(1));
    }

    #[test]
    fn test_containment_ignores_apostrophes() {
        let l_headers = headers(&["Nome", "TOTALE SOMME NON SOGGETTE A RITENUTA DACCONTO (EUR)"]);
        assert_eq!(
            match_column(&l_headers, "TOTALE SOMME NON SOGGETTE A RITENUTA D'ACCONTO"),
            EnumColumnMatch::Contains(1)
        );
    }

    #[test]
    fn test_first_containing_header_is_selected() {
        let l_headers = headers(&["x C. Fisc", "C. Fisc y"]);
        assert_eq!(match_column(&l_headers, "C. Fisc"), EnumColumnMatch::Contains(0));
    }

    #[test]
    fn test_whitespace_is_significant() {
        let l_headers = headers(&["C.Fisc "]);
        assert_eq!(match_column(&l_headers, "C. Fisc"), EnumColumnMatch::Missing);
    }

    #[test]
    fn test_reconcile_orders_and_fills_columns() {
        let records = SpecRecordSet::try_new(
            headers(&["extra", "C. Fisc", "Nome Percipiente (primo)"]),
            vec![
                vec![
                    EnumCellValue::Number(1.0),
                    EnumCellValue::text("RSSMRA85M01H501Z"),
                    EnumCellValue::text("Mario"),
                ],
                vec![EnumCellValue::None, EnumCellValue::None, EnumCellValue::text("Anna")],
            ],
        )
        .unwrap();

        let reconciled =
            reconcile_columns(&records, &["Nome Percipiente", "C. Fisc", "P. Iva"]).unwrap();
        assert_eq!(reconciled.columns(), &headers(&["Nome Percipiente", "C. Fisc", "P. Iva"]));
        assert_eq!(reconciled.height(), 2);
        assert_eq!(reconciled.rows()[0][0], EnumCellValue::text("Mario"));
        assert_eq!(reconciled.rows()[0][1], EnumCellValue::text("RSSMRA85M01H501Z"));
        assert_eq!(reconciled.rows()[0][2], EnumCellValue::empty());
        assert_eq!(reconciled.rows()[1][1], EnumCellValue::None);
        assert_eq!(reconciled.rows()[1][2], EnumCellValue::empty());
    }
}
