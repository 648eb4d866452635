use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;

/// One product row of the fashion sample table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleRow {
    /// Relative image filename.
    pub image: String,
    #[serde(rename = "baseColour")]
    pub base_colour: String,
    #[serde(rename = "articleType")]
    pub article_type: String,
    pub gender: String,
}

impl SampleRow {
    /// `"A {baseColour} {articleType} for {gender}"`
    pub fn base_caption(&self) -> String {
        format!(
            "A {} {} for {}",
            self.base_colour.trim(),
            self.article_type.trim(),
            self.gender.trim()
        )
    }

    fn is_complete(&self) -> bool {
        [&self.image, &self.base_colour, &self.article_type, &self.gender]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    rows: Vec<SampleRow>,
}

impl SampleTable {
    /// Reads CSV with headers; unknown columns are ignored and incomplete rows
    /// skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (index, record) in csv.deserialize::<SampleRow>().enumerate() {
            match record {
                Ok(row) if row.is_complete() => rows.push(row),
                Ok(row) => warn!(
                    line = index + 2,
                    image = row.image.as_str(),
                    "Skipping incomplete sample row"
                ),
                Err(err) => warn!(line = index + 2, "Skipping unreadable sample row: {err}"),
            }
        }

        Ok(Self { rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!("Loaded {} sample rows from {:?}", table.len(), path);
        Ok(table)
    }

    /// Picks a row using the caller's random source.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<&SampleRow> {
        if self.rows.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.rows.len());
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const STYLES_CSV: &str = "\
id,gender,masterCategory,articleType,baseColour,image
1,Women,Apparel,Dress,Red,1.jpg
2,Men,Footwear,Formal Shoes,Grey,2.jpg
3,Men,Apparel,,Blue,3.jpg
4,Men,Apparel,Jackets,Brown,4.jpg
";

    #[test]
    fn builds_base_caption_from_columns() {
        let table = SampleTable::from_reader(STYLES_CSV.as_bytes()).expect("parse");
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0].base_caption(), "A Red Dress for Women");
        assert_eq!(table.rows()[1].base_caption(), "A Grey Formal Shoes for Men");
        assert_eq!(table.rows()[2].image, "4.jpg");
    }

    #[test]
    fn seeded_picks_are_reproducible() {
        let table = SampleTable::from_reader(STYLES_CSV.as_bytes()).expect("parse");

        let picks = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..8)
                .map(|_| table.pick(&mut rng).expect("row").image.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(picks(7), picks(7));
        assert!(picks(7).iter().all(|image| ["1.jpg", "2.jpg", "4.jpg"].contains(&image.as_str())));
    }

    #[test]
    fn empty_table_picks_nothing() {
        let table = SampleTable::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(table.pick(&mut rng).is_none());
    }

    #[test]
    fn whitespace_only_fields_count_as_missing() {
        let csv = "image,baseColour,articleType,gender\na.jpg,Black,Tshirts,Men\nb.jpg,\"  \",Tshirts,Men\n";
        let table = SampleTable::from_reader(csv.as_bytes()).expect("parse");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].image, "a.jpg");
    }
}
