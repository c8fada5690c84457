//! Single-player 10x10 grid: ship placement, shot resolution and the
//! fixed-width string encoding sent to clients.
//!
//! Coordinates are `(x, y)` with `x` selecting the row and `y` the column.
//! The encoding is row-major, so cell `(x, y)` lives at index `x * 10 + y`.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;

/// Grid side length
pub const BOARD_DIM: usize = 10;

/// Ship lengths placed on every board
pub const SHIP_SIZES: [usize; 5] = [2, 3, 3, 4, 5];

/// Total number of ship segments on a populated board
pub const SHIP_PART_COUNT: usize = 17;

/// Length of the serialized board string
pub const ENCODED_LEN: usize = BOARD_DIM * BOARD_DIM;

/// Attempts per ship before the whole layout is thrown away and restarted
const MAX_PLACEMENT_ATTEMPTS: u32 = 10_000;

/// Grid coordinate `(x, y)`
pub type Coord = (usize, usize);

/// Cells of one ship, in placement order
pub type ShipRun = Vec<Coord>;

/// Cell state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Empty,
    Ship,
    Hit,
    Miss,
}

impl Cell {
    /// Wire symbol for this cell
    pub fn symbol(self) -> char {
        match self {
            Cell::Empty => '0',
            Cell::Ship => '1',
            Cell::Hit => '2',
            Cell::Miss => '3',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '0' => Some(Cell::Empty),
            '1' => Some(Cell::Ship),
            '2' => Some(Cell::Hit),
            '3' => Some(Cell::Miss),
            _ => None,
        }
    }
}

/// Axis direction a ship extends in from its origin cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Cell `offset` steps away from `origin`, or None if it leaves the grid
    fn step(self, (x, y): Coord, offset: usize) -> Option<Coord> {
        let (x, y) = match self {
            Direction::Up => (Some(x), y.checked_add(offset)),
            Direction::Down => (Some(x), y.checked_sub(offset)),
            Direction::Left => (x.checked_sub(offset), Some(y)),
            Direction::Right => (x.checked_add(offset), Some(y)),
        };
        match (x, y) {
            (Some(x), Some(y)) if x < BOARD_DIM && y < BOARD_DIM => Some((x, y)),
            _ => None,
        }
    }
}

/// Board errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Coordinate ({x}, {y}) is outside the board")]
    OutOfBounds { x: i64, y: i64 },

    #[error("Only hit or miss can be recorded, got {0:?}")]
    InvalidOutcome(Cell),

    #[error("Invalid board encoding: {0}")]
    Decode(String),
}

/// One side's grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; BOARD_DIM]; BOARD_DIM],
    ship_cells: BTreeSet<Coord>,
    hit_cells: BTreeSet<Coord>,
    miss_cells: BTreeSet<Coord>,
    finished: bool,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Empty board with no ships
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; BOARD_DIM]; BOARD_DIM],
            ship_cells: BTreeSet::new(),
            hit_cells: BTreeSet::new(),
            miss_cells: BTreeSet::new(),
            finished: false,
        }
    }

    /// Board with a random legal fleet already placed
    pub fn populated<R: Rng>(rng: &mut R) -> Self {
        let mut board = Self::new();
        board.populate(rng);
        board
    }

    pub fn check_bounds(x: usize, y: usize) -> Result<(), BoardError> {
        if x < BOARD_DIM && y < BOARD_DIM {
            Ok(())
        } else {
            Err(BoardError::OutOfBounds {
                x: x as i64,
                y: y as i64,
            })
        }
    }

    pub fn cell(&self, x: usize, y: usize) -> Result<Cell, BoardError> {
        Self::check_bounds(x, y)?;
        Ok(self.cells[x][y])
    }

    pub fn ship_cells(&self) -> &BTreeSet<Coord> {
        &self.ship_cells
    }

    pub fn hit_cells(&self) -> &BTreeSet<Coord> {
        &self.hit_cells
    }

    pub fn miss_cells(&self) -> &BTreeSet<Coord> {
        &self.miss_cells
    }

    /// True once every ship segment has been hit
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Ship segments not yet hit
    pub fn remaining_ship_parts(&self) -> usize {
        self.ship_cells
            .iter()
            .filter(|&&(x, y)| self.cells[x][y] == Cell::Ship)
            .count()
    }

    /// Randomly place the standard fleet.
    ///
    /// No-op if the board already knows about any ship cell. Returns the runs
    /// placed by this call (empty when nothing was placed).
    pub fn populate<R: Rng>(&mut self, rng: &mut R) -> Vec<ShipRun> {
        if !self.ship_cells.is_empty() {
            return Vec::new();
        }

        'layout: loop {
            let mut runs = Vec::with_capacity(SHIP_SIZES.len());

            for size in SHIP_SIZES {
                let mut attempts = 0;
                let run = loop {
                    attempts += 1;
                    if attempts > MAX_PLACEMENT_ATTEMPTS {
                        tracing::warn!(size, "Ship placement stalled, restarting layout");
                        self.clear();
                        continue 'layout;
                    }

                    let origin = (rng.gen_range(0..BOARD_DIM), rng.gen_range(0..BOARD_DIM));
                    let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
                    if let Some(run) = self.free_run(origin, direction, size) {
                        break run;
                    }
                };

                for &(x, y) in &run {
                    self.cells[x][y] = Cell::Ship;
                    self.ship_cells.insert((x, y));
                }
                runs.push(run);
            }

            return runs;
        }
    }

    /// `size` consecutive in-bounds Empty cells from `origin`, or None if the
    /// placement is illegal
    fn free_run(&self, origin: Coord, direction: Direction, size: usize) -> Option<ShipRun> {
        (0..size)
            .map(|offset| {
                direction
                    .step(origin, offset)
                    .filter(|&(x, y)| self.cells[x][y] == Cell::Empty)
            })
            .collect()
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    /// Fire at `(x, y)`. Returns true on a hit.
    ///
    /// Firing at an already resolved cell changes nothing and reports the
    /// original outcome again.
    pub fn hit(&mut self, x: usize, y: usize) -> Result<bool, BoardError> {
        Self::check_bounds(x, y)?;
        match self.cells[x][y] {
            Cell::Empty => {
                self.cells[x][y] = Cell::Miss;
                self.miss_cells.insert((x, y));
                Ok(false)
            }
            Cell::Ship => {
                self.cells[x][y] = Cell::Hit;
                self.hit_cells.insert((x, y));
                self.update_finished();
                Ok(true)
            }
            Cell::Hit => Ok(true),
            Cell::Miss => Ok(false),
        }
    }

    /// Write a known shot outcome without ship knowledge. Used for the
    /// opponent-view board rebuilt from relayed results.
    pub fn record(&mut self, x: usize, y: usize, outcome: Cell) -> Result<(), BoardError> {
        Self::check_bounds(x, y)?;
        match outcome {
            Cell::Hit => {
                self.cells[x][y] = Cell::Hit;
                self.miss_cells.remove(&(x, y));
                self.hit_cells.insert((x, y));
                self.ship_cells.insert((x, y));
                self.update_finished();
            }
            Cell::Miss => {
                self.cells[x][y] = Cell::Miss;
                self.hit_cells.remove(&(x, y));
                self.ship_cells.remove(&(x, y));
                self.miss_cells.insert((x, y));
                self.update_finished();
            }
            other => return Err(BoardError::InvalidOutcome(other)),
        }
        Ok(())
    }

    fn update_finished(&mut self) {
        let sunk = self
            .ship_cells
            .iter()
            .filter(|&&(x, y)| self.cells[x][y] == Cell::Hit)
            .count();
        self.finished = sunk == SHIP_PART_COUNT;
    }

    /// Row-major 100 symbol encoding. With `hide_ships` unhit ship cells are
    /// rendered as empty.
    pub fn serialize(&self, hide_ships: bool) -> String {
        self.cells
            .iter()
            .flatten()
            .map(|&cell| match cell {
                Cell::Ship if hide_ships => Cell::Empty.symbol(),
                cell => cell.symbol(),
            })
            .collect()
    }

    pub fn deserialize(encoded: &str) -> Result<Self, BoardError> {
        let symbols: Vec<char> = encoded.chars().collect();
        if symbols.len() != ENCODED_LEN {
            return Err(BoardError::Decode(format!(
                "expected {} cells, got {}",
                ENCODED_LEN,
                symbols.len()
            )));
        }

        let mut board = Self::new();
        for (index, &symbol) in symbols.iter().enumerate() {
            let cell = Cell::from_symbol(symbol).ok_or_else(|| {
                BoardError::Decode(format!("unknown symbol {:?} at {}", symbol, index))
            })?;
            let coord = (index / BOARD_DIM, index % BOARD_DIM);
            board.cells[coord.0][coord.1] = cell;
            match cell {
                Cell::Ship => {
                    board.ship_cells.insert(coord);
                }
                Cell::Hit => {
                    board.ship_cells.insert(coord);
                    board.hit_cells.insert(coord);
                }
                Cell::Miss => {
                    board.miss_cells.insert(coord);
                }
                Cell::Empty => {}
            }
        }
        board.update_finished();
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for y in 0..BOARD_DIM {
            write!(f, " {}", y)?;
        }
        writeln!(f)?;
        for (x, row) in self.cells.iter().enumerate() {
            write!(f, "{:>2} ", x)?;
            for cell in row {
                let glyph = match cell {
                    Cell::Empty => '.',
                    Cell::Ship => 'S',
                    Cell::Hit => 'X',
                    Cell::Miss => 'o',
                };
                write!(f, " {}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn seeded(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    /// Hand-placed fleet: rows 0..5, ships start at column 0
    fn fixture() -> Board {
        let mut encoded = String::new();
        for size in SHIP_SIZES {
            for col in 0..BOARD_DIM {
                encoded.push(if col < size { '1' } else { '0' });
            }
        }
        encoded.push_str(&"0".repeat(ENCODED_LEN - encoded.len()));
        Board::deserialize(&encoded).unwrap()
    }

    fn is_straight_run(run: &[Coord]) -> bool {
        let same_row = run.iter().all(|c| c.0 == run[0].0);
        let same_col = run.iter().all(|c| c.1 == run[0].1);
        if !(same_row || same_col) {
            return false;
        }
        let mut axis: Vec<usize> = run.iter().map(|c| if same_row { c.1 } else { c.0 }).collect();
        axis.sort_unstable();
        axis.windows(2).all(|w| w[1] == w[0] + 1)
    }

    #[test]
    fn new_board_is_empty() {
        let board = Board::new();
        assert!(board.ship_cells().is_empty());
        assert!(!board.is_finished());
        assert_eq!(board.serialize(false), "0".repeat(ENCODED_LEN));
    }

    #[test]
    fn populate_is_idempotent() {
        let mut rng = seeded(7);
        let mut board = Board::new();
        let runs = board.populate(&mut rng);
        assert_eq!(runs.len(), SHIP_SIZES.len());
        let before = board.clone();
        assert!(board.populate(&mut rng).is_empty());
        assert_eq!(board, before);
    }

    #[test]
    fn hit_and_miss_update_cells() {
        let mut board = fixture();
        assert!(board.hit(0, 0).unwrap());
        assert_eq!(board.cell(0, 0).unwrap(), Cell::Hit);
        assert!(!board.hit(9, 9).unwrap());
        assert_eq!(board.cell(9, 9).unwrap(), Cell::Miss);
        assert_eq!(board.hit_cells().len(), 1);
        assert_eq!(board.miss_cells().len(), 1);
    }

    #[test]
    fn rehit_is_a_noop_with_original_outcome() {
        let mut board = fixture();
        assert!(board.hit(0, 1).unwrap());
        assert!(!board.hit(8, 8).unwrap());
        let snapshot = board.clone();

        assert!(board.hit(0, 1).unwrap());
        assert!(!board.hit(8, 8).unwrap());
        assert_eq!(board, snapshot);
        assert_eq!(board.cell(0, 1).unwrap(), Cell::Hit);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut board = fixture();
        assert_eq!(
            board.hit(10, 0).unwrap_err(),
            BoardError::OutOfBounds { x: 10, y: 0 }
        );
        assert!(board.record(0, 12, Cell::Miss).is_err());
        assert!(board.cell(11, 11).is_err());
    }

    #[test]
    fn finished_flips_on_last_ship_part() {
        let mut board = fixture();
        let ships: Vec<Coord> = board.ship_cells().iter().copied().collect();
        let (last, rest) = ships.split_last().unwrap();
        for &(x, y) in rest {
            assert!(board.hit(x, y).unwrap());
            assert!(!board.is_finished());
        }
        assert_eq!(board.remaining_ship_parts(), 1);
        assert!(board.hit(last.0, last.1).unwrap());
        assert!(board.is_finished());
        assert_eq!(board.remaining_ship_parts(), 0);
    }

    #[test]
    fn record_builds_an_opponent_view() {
        let mut view = Board::new();
        view.record(4, 4, Cell::Miss).unwrap();
        view.record(2, 3, Cell::Hit).unwrap();
        assert_eq!(view.cell(4, 4).unwrap(), Cell::Miss);
        assert!(view.ship_cells().contains(&(2, 3)));
        assert!(!view.is_finished());
        assert_eq!(
            view.record(1, 1, Cell::Ship).unwrap_err(),
            BoardError::InvalidOutcome(Cell::Ship)
        );
    }

    #[test]
    fn overwritten_record_keeps_view_consistent() {
        let mut view = Board::new();
        view.record(2, 3, Cell::Hit).unwrap();
        view.record(2, 3, Cell::Miss).unwrap();
        assert_eq!(view.cell(2, 3).unwrap(), Cell::Miss);
        assert!(!view.ship_cells().contains(&(2, 3)));
        assert_eq!(Board::deserialize(&view.serialize(false)).unwrap(), view);

        view.record(2, 3, Cell::Hit).unwrap();
        assert_eq!(view.cell(2, 3).unwrap(), Cell::Hit);
        assert!(view.ship_cells().contains(&(2, 3)));
        assert_eq!(Board::deserialize(&view.serialize(false)).unwrap(), view);
    }

    #[test]
    fn recorded_view_finishes_after_all_hits() {
        let source = fixture();
        let mut view = Board::new();
        for &(x, y) in source.ship_cells() {
            view.record(x, y, Cell::Hit).unwrap();
        }
        assert!(view.is_finished());
    }

    #[test]
    fn deserialize_rejects_bad_input() {
        assert!(matches!(Board::deserialize("0123"), Err(BoardError::Decode(_))));
        let mut bad = "0".repeat(ENCODED_LEN - 1);
        bad.push('7');
        assert!(matches!(Board::deserialize(&bad), Err(BoardError::Decode(_))));
    }

    #[test]
    fn display_marks_hits() {
        let mut board = fixture();
        board.hit(0, 0).unwrap();
        let rendered = board.to_string();
        assert!(rendered.contains('X'));
        assert!(rendered.contains('S'));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn populate_places_legal_fleet(seed in any::<u64>()) {
            let mut board = Board::new();
            let runs = board.populate(&mut seeded(seed));

            prop_assert_eq!(board.ship_cells().len(), SHIP_PART_COUNT);
            let mut sizes: Vec<usize> = runs.iter().map(Vec::len).collect();
            sizes.sort_unstable();
            prop_assert_eq!(sizes, SHIP_SIZES.to_vec());

            let mut seen = BTreeSet::new();
            for run in &runs {
                prop_assert!(is_straight_run(run));
                for &(x, y) in run {
                    prop_assert!(x < BOARD_DIM && y < BOARD_DIM);
                    prop_assert!(seen.insert((x, y)));
                    prop_assert_eq!(board.cell(x, y).unwrap(), Cell::Ship);
                }
            }
        }

        #[test]
        fn hit_resolves_against_ship_layout(seed in any::<u64>(), x in 0..BOARD_DIM, y in 0..BOARD_DIM) {
            let mut board = Board::populated(&mut seeded(seed));
            let was_ship = board.cell(x, y).unwrap() == Cell::Ship;
            let hit = board.hit(x, y).unwrap();
            prop_assert_eq!(hit, was_ship);
            let expected = if was_ship { Cell::Hit } else { Cell::Miss };
            prop_assert_eq!(board.cell(x, y).unwrap(), expected);
            prop_assert_eq!(board.hit(x, y).unwrap(), hit);
            prop_assert_eq!(board.cell(x, y).unwrap(), expected);
        }

        #[test]
        fn serialization_round_trips(seed in any::<u64>(), shots in proptest::collection::vec((0..BOARD_DIM, 0..BOARD_DIM), 0..40)) {
            let mut board = Board::populated(&mut seeded(seed));
            for (x, y) in shots {
                board.hit(x, y).unwrap();
            }
            let encoded = board.serialize(false);
            prop_assert_eq!(encoded.len(), ENCODED_LEN);
            prop_assert_eq!(Board::deserialize(&encoded).unwrap(), board.clone());

            let masked = board.serialize(true);
            prop_assert!(!masked.contains(Cell::Ship.symbol()));
            prop_assert_eq!(masked.len(), ENCODED_LEN);
        }
    }
}
