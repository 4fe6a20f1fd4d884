/// Rectangular arena of genomes, stored row-major in one buffer.
///
/// Every row always has the same width. Growing the pool inserts a column
/// into every row at once, which is what keeps gene positions meaning the same
/// thing across a whole population under structural mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenePool<G> {
    rows: usize,
    width: usize,
    genes: Vec<G>,
}

impl<G: Clone> GenePool<G> {
    /// Packs equally long genomes into a pool.
    ///
    /// # Panics
    /// Panics if the genomes differ in length.
    pub fn from_rows(rows: Vec<Vec<G>>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let count = rows.len();
        let mut genes = Vec::with_capacity(count * width);
        for row in rows {
            assert_eq!(row.len(), width, "aligned genomes must share one length");
            genes.extend(row);
        }
        Self {
            rows: count,
            width,
            genes,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, row: usize) -> &[G] {
        &self.genes[row * self.width..(row + 1) * self.width]
    }

    pub fn get(&self, row: usize, column: usize) -> &G {
        assert!(column < self.width);
        &self.genes[row * self.width + column]
    }

    pub fn set(&mut self, row: usize, column: usize, gene: G) {
        assert!(column < self.width);
        self.genes[row * self.width + column] = gene;
    }

    /// Inserts `fill` at `column` in every row, shifting later genes right.
    ///
    /// # Arguments
    /// * `column` - Index of the new column. May equal the width, which appends.
    /// * `fill` - Gene written into every row; callers overwrite the rows that
    ///   need something else.
    ///
    /// # Panics
    /// Panics if `column` is beyond the width.
    pub fn insert_column(&mut self, column: usize, fill: G) {
        assert!(column <= self.width, "column {column} beyond width {}", self.width);
        let new_width = self.width + 1;
        let mut genes = Vec::with_capacity(self.rows * new_width);
        for row in 0..self.rows {
            let start = row * self.width;
            genes.extend_from_slice(&self.genes[start..start + column]);
            genes.push(fill.clone());
            genes.extend_from_slice(&self.genes[start + column..start + self.width]);
        }
        self.genes = genes;
        self.width = new_width;
    }

    pub fn into_rows(self) -> Vec<Vec<G>> {
        if self.width == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.genes
            .chunks_exact(self.width)
            .map(<[G]>::to_vec)
            .collect()
    }
}

impl<G: Clone + PartialEq> GenePool<G> {
    /// Removes every column that holds `null` in all rows.
    ///
    /// # Returns
    /// * `usize` - Number of columns removed.
    pub fn drop_null_columns(&mut self, null: &G) -> usize {
        let keep: Vec<bool> = (0..self.width)
            .map(|column| (0..self.rows).any(|row| *self.get(row, column) != *null))
            .collect();
        let new_width = keep.iter().filter(|&&k| k).count();
        let removed = self.width - new_width;
        if removed == 0 {
            return 0;
        }
        let mut genes = Vec::with_capacity(self.rows * new_width);
        for row in 0..self.rows {
            let start = row * self.width;
            genes.extend(
                self.genes[start..start + self.width]
                    .iter()
                    .zip(&keep)
                    .filter(|(_, keep)| **keep)
                    .map(|(gene, _)| gene.clone()),
            );
        }
        self.genes = genes;
        self.width = new_width;
        removed
    }
}
