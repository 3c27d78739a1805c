use std::fmt;

/// A station on the stage, named by its row and column labels
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position
{
    pub row: String,
    pub column: String
}

impl Position
{
    pub fn new(row: &str, column: &str) -> Position
    {
        Position {row: String::from(row), column: String::from(column)}
    }
}

impl fmt::Display for Position
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

#[derive(Debug)]
pub struct EmptyAxis;

impl fmt::Display for EmptyAxis
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Grid needs at least one row and one column")
    }
}

impl std::error::Error for EmptyAxis {}

/// Row and column labels of the stations, visited row by row.
///
/// Move index `i` is at column `i mod columns` of row `i div columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionGrid
{
    columns: Vec<String>,
    rows: Vec<String>
}

impl PositionGrid
{
    /// Returns a grid or `EmptyAxis` if either label list is empty
    ///
    /// # Arguments
    /// * `columns` - Column labels in visiting order
    /// * `rows` - Row labels in visiting order
    pub fn new(columns: Vec<String>, rows: Vec<String>) -> Result<PositionGrid, EmptyAxis>
    {
        if columns.is_empty() || rows.is_empty() {
            return Err(EmptyAxis);
        }
        Ok(PositionGrid {columns, rows})
    }

    /// Columns labelled 1..=n_columns and rows labelled A, B, C, ...
    pub fn lettered(n_columns: usize, n_rows: usize) -> Result<PositionGrid, EmptyAxis>
    {
        let columns = (1..=n_columns).map(|c| c.to_string()).collect();
        let rows = (0..n_rows).map(row_letter).collect();
        PositionGrid::new(columns, rows)
    }

    pub fn columns(&self) -> &[String]
    {
        &self.columns
    }

    pub fn rows(&self) -> &[String]
    {
        &self.rows
    }

    pub fn total_stations(&self) -> usize
    {
        self.columns.len() * self.rows.len()
    }

    /// Position of the station reached after `move_index` moves.
    ///
    /// The column wraps for any index. The row is only meaningful for
    /// indices below `total_stations()`; past that the row wraps too, so
    /// callers must bound the index themselves.
    pub fn position_for(&self, move_index: usize) -> Position
    {
        let n_cols = self.columns.len();
        let column = &self.columns[move_index % n_cols];
        let row = &self.rows[(move_index / n_cols) % self.rows.len()];
        Position::new(row, column)
    }

    /// All stations in visiting order
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_
    {
        (0..self.total_stations()).map(move |i| self.position_for(i))
    }

    pub fn contains(&self, row: &str, column: &str) -> bool
    {
        self.rows.iter().any(|r| r == row) && self.columns.iter().any(|c| c == column)
    }

    /// Splits a station name like `B3` into its row and column labels
    pub fn parse_station(&self, name: &str) -> Option<Position>
    {
        self.rows.iter()
            .filter(|row| name.starts_with(row.as_str()))
            .find_map(|row| {
                let column = &name[row.len()..];
                if self.columns.iter().any(|c| c == column) {
                    Some(Position::new(row, column))
                } else {
                    None
                }
            })
    }
}

// A..Z, then AA, AB, ...
fn row_letter(index: usize) -> String
{
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        label.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}
