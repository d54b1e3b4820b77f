//! Cube covers: sums of product terms over a fixed set of input columns.
//!
//! A [`Cover`] is the sum-of-products input consumed by the DAG builder and
//! carried by internal network nodes. Each [`Cube`] holds one literal per
//! input column; a column can appear positive, negative, or not at all.

use std::fmt::{Display, Formatter};

use log::debug;

/// The phase of one input column inside a cube.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Literal {
    Pos,
    Neg,
    Absent,
}

impl Literal {
    pub fn negate(self) -> Self {
        match self {
            Literal::Pos => Literal::Neg,
            Literal::Neg => Literal::Pos,
            Literal::Absent => Literal::Absent,
        }
    }
}

/// One product term: a literal per input column.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cube {
    lits: Vec<Literal>,
}

impl Cube {
    /// The all-don't-care ("universal") cube.
    pub fn universal(width: usize) -> Self {
        Self { lits: vec![Literal::Absent; width] }
    }

    pub fn from_lits(lits: Vec<Literal>) -> Self {
        Self { lits }
    }

    pub fn width(&self) -> usize {
        self.lits.len()
    }

    pub fn lit(&self, col: usize) -> Literal {
        self.lits[col]
    }

    pub fn set(&mut self, col: usize, lit: Literal) {
        self.lits[col] = lit;
    }

    /// A copy of the cube with one column replaced.
    pub fn with(&self, col: usize, lit: Literal) -> Self {
        let mut cube = self.clone();
        cube.set(col, lit);
        cube
    }

    pub fn is_universal(&self) -> bool {
        self.lits.iter().all(|&l| l == Literal::Absent)
    }

    /// Columns with a present literal.
    pub fn present(&self) -> impl Iterator<Item = usize> + '_ {
        self.lits
            .iter()
            .enumerate()
            .filter(|(_, &l)| l != Literal::Absent)
            .map(|(col, _)| col)
    }

    pub fn literal_count(&self) -> usize {
        self.present().count()
    }

    /// Cofactor against `col = phase`: `None` when the cube vanishes
    /// (opposite literal), otherwise the cube with the column dropped.
    pub fn cofactor(&self, col: usize, phase: bool) -> Option<Cube> {
        match (self.lits[col], phase) {
            (Literal::Absent, _) => Some(self.clone()),
            (Literal::Pos, true) | (Literal::Neg, false) => {
                Some(self.with(col, Literal::Absent))
            }
            (Literal::Pos, false) | (Literal::Neg, true) => None,
        }
    }

    /// Whether the cube evaluates to true under the assignment.
    pub fn eval(&self, assignment: &[bool]) -> bool {
        self.lits.iter().enumerate().all(|(col, &l)| match l {
            Literal::Pos => assignment[col],
            Literal::Neg => !assignment[col],
            Literal::Absent => true,
        })
    }
}

impl Display for Cube {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for &l in &self.lits {
            let c = match l {
                Literal::Pos => '1',
                Literal::Neg => '0',
                Literal::Absent => '-',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// A set of cubes over `width` input columns.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cover {
    cubes: Vec<Cube>,
    width: usize,
}

impl Cover {
    /// The empty cover (constant false).
    pub fn empty(width: usize) -> Self {
        Self { cubes: Vec::new(), width }
    }

    /// The single-universal-cube cover (constant true).
    pub fn universe(width: usize) -> Self {
        Self { cubes: vec![Cube::universal(width)], width }
    }

    pub fn from_cubes(width: usize, cubes: Vec<Cube>) -> Self {
        for cube in &cubes {
            assert_eq!(cube.width(), width, "cube width mismatch");
        }
        Self { cubes, width }
    }

    /// Parse cubes from PLA-style rows (`1` positive, `0` negative, `-` absent).
    pub fn parse(width: usize, rows: &[&str]) -> Self {
        let cubes = rows
            .iter()
            .map(|row| {
                assert_eq!(row.len(), width, "row width mismatch");
                Cube::from_lits(
                    row.chars()
                        .map(|c| match c {
                            '1' => Literal::Pos,
                            '0' => Literal::Neg,
                            '-' => Literal::Absent,
                            _ => panic!("bad literal character {:?}", c),
                        })
                        .collect(),
                )
            })
            .collect();
        Self { cubes, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cubes(&self) -> &[Cube] {
        &self.cubes
    }

    pub fn add_cube(&mut self, cube: Cube) {
        assert_eq!(cube.width(), self.width, "cube width mismatch");
        self.cubes.push(cube);
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    /// A universal row makes the whole cover a tautology.
    pub fn has_universal_row(&self) -> bool {
        self.cubes.iter().any(|c| c.is_universal())
    }

    /// Positive/negative occurrence counts for one column.
    pub fn counts(&self, col: usize) -> (usize, usize) {
        let mut pos = 0;
        let mut neg = 0;
        for cube in &self.cubes {
            match cube.lit(col) {
                Literal::Pos => pos += 1,
                Literal::Neg => neg += 1,
                Literal::Absent => {}
            }
        }
        (pos, neg)
    }

    /// A column is unate when it appears in at most one phase.
    pub fn is_unate_in(&self, col: usize) -> bool {
        let (pos, neg) = self.counts(col);
        pos == 0 || neg == 0
    }

    /// Columns with at least one present literal.
    pub fn support(&self) -> Vec<usize> {
        (0..self.width)
            .filter(|&col| {
                let (pos, neg) = self.counts(col);
                pos + neg > 0
            })
            .collect()
    }

    pub fn cofactor(&self, col: usize, phase: bool) -> Cover {
        let cubes = self
            .cubes
            .iter()
            .filter_map(|c| c.cofactor(col, phase))
            .collect();
        Cover { cubes, width: self.width }
    }

    /// Conjunction: the cross product of cube pairs, dropping contradictions.
    pub fn and(&self, other: &Cover) -> Cover {
        assert_eq!(self.width, other.width, "cover width mismatch");
        let mut cubes = Vec::new();
        for a in &self.cubes {
            'pairs: for b in &other.cubes {
                let mut merged = a.clone();
                for col in 0..self.width {
                    match (a.lit(col), b.lit(col)) {
                        (_, Literal::Absent) => {}
                        (Literal::Absent, l) => merged.set(col, l),
                        (x, y) if x == y => {}
                        _ => continue 'pairs,
                    }
                }
                cubes.push(merged);
            }
        }
        let mut cover = Cover { cubes, width: self.width };
        cover.dedup();
        cover
    }

    /// Disjunction: the union of the two cube sets.
    pub fn or(&self, other: &Cover) -> Cover {
        assert_eq!(self.width, other.width, "cover width mismatch");
        let mut cubes = self.cubes.clone();
        cubes.extend(other.cubes.iter().cloned());
        let mut cover = Cover { cubes, width: self.width };
        cover.dedup();
        cover
    }

    fn dedup(&mut self) {
        self.cubes.sort_unstable();
        self.cubes.dedup();
    }

    /// Complement through unate-recursive Shannon expansion:
    /// `C' = x (C_x)' + x' (C_x')'`.
    pub fn complement(&self) -> Cover {
        if self.has_universal_row() {
            return Cover::empty(self.width);
        }
        if self.cubes.is_empty() {
            return Cover::universe(self.width);
        }
        let col = self
            .support()
            .into_iter()
            .next()
            .expect("non-trivial cover has a present column");
        debug!("complement: splitting on column {}", col);
        let pos = self.cofactor(col, true).complement();
        let neg = self.cofactor(col, false).complement();
        let lit_pos = Cover::from_cubes(
            self.width,
            vec![Cube::universal(self.width).with(col, Literal::Pos)],
        );
        let lit_neg = Cover::from_cubes(
            self.width,
            vec![Cube::universal(self.width).with(col, Literal::Neg)],
        );
        lit_pos.and(&pos).or(&lit_neg.and(&neg))
    }

    /// Swap the phase of every literal in one column.
    pub fn negate_column(&self, col: usize) -> Cover {
        let cubes = self
            .cubes
            .iter()
            .map(|cube| cube.with(col, cube.lit(col).negate()))
            .collect();
        Cover { cubes, width: self.width }
    }

    /// Re-express the cover over a wider column space; `col_map[i]` is the
    /// new position of old column `i`.
    pub fn remap(&self, new_width: usize, col_map: &[usize]) -> Cover {
        assert_eq!(col_map.len(), self.width, "column map width mismatch");
        let cubes = self
            .cubes
            .iter()
            .map(|cube| {
                let mut lits = vec![Literal::Absent; new_width];
                for col in cube.present() {
                    lits[col_map[col]] = cube.lit(col);
                }
                Cube::from_lits(lits)
            })
            .collect();
        Cover { cubes, width: new_width }
    }

    /// Whether the cover evaluates to true under the assignment.
    pub fn eval(&self, assignment: &[bool]) -> bool {
        self.cubes.iter().any(|c| c.eval(assignment))
    }

    /// Syntactic equality of the two cube sets.
    pub fn same_cubes(&self, other: &Cover) -> bool {
        if self.width != other.width || self.cubes.len() != other.cubes.len() {
            return false;
        }
        let mut a = self.cubes.clone();
        let mut b = other.cubes.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

impl Display for Cover {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.cubes.is_empty() {
            return write!(f, "<empty>");
        }
        for (i, cube) in self.cubes.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}", cube)?;
        }
        Ok(())
    }
}
