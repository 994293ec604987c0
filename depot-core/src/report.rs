//! State report printed on demand.

use std::fmt;

use crate::inventory::Item;

/// Snapshot of a depot: stocked goods and neighbour names, both sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    pub goods: Vec<Item>,
    pub neighbours: Vec<String>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Goods:")?;
        for item in &self.goods {
            writeln!(f, "{} {}", item.name, item.quantity)?;
        }
        writeln!(f, "Neighbours:")?;
        for name in &self.neighbours {
            writeln!(f, "{name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sections() {
        let report = Report {
            goods: vec![
                Item {
                    name: "apple".into(),
                    quantity: 4,
                },
                Item {
                    name: "pear".into(),
                    quantity: -2,
                },
            ],
            neighbours: vec!["Bob".into()],
        };
        assert_eq!(
            report.to_string(),
            "Goods:\napple 4\npear -2\nNeighbours:\nBob\n"
        );
    }

    #[test]
    fn empty_report_keeps_headers() {
        assert_eq!(Report::default().to_string(), "Goods:\nNeighbours:\n");
    }
}
