//! Nearest-neighbour energy parameters at 37 °C, in dcal/mol.
//!
//! Stacking and hairpin values follow the Turner 2004 set. Bulges, interior
//! loops and multiloops share one flat penalty.

/// kcal/(mol·K)
pub const GAS_CONSTANT: f64 = 1.98717e-3;
pub const ZERO_CELSIUS: f64 = 273.15;
pub const DEFAULT_TEMPERATURE: f64 = 37.0;

/// Fewest unpaired bases enclosed by a hairpin.
pub const MIN_HAIRPIN: usize = 3;

/// Any closed loop that is neither a hairpin nor a stack.
pub const LOOP_PENALTY: i32 = 340;

/// Large-loop extrapolation coefficient (dcal/mol).
const LXC37: f64 = 107.856;

/// Hairpin initiation for loop sizes 0..=9; sizes below 3 are forbidden.
const HAIRPIN: [i32; 10] = [i32::MAX, i32::MAX, i32::MAX, 540, 560, 570, 540, 600, 550, 640];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairType {
    CG,
    GC,
    GU,
    UG,
    AU,
    UA,
}

impl PairType {
    fn index(self) -> usize {
        match self {
            PairType::CG => 0,
            PairType::GC => 1,
            PairType::GU => 2,
            PairType::UG => 3,
            PairType::AU => 4,
            PairType::UA => 5,
        }
    }
}

/// Canonical and wobble pairs; `None` for anything else.
pub fn pair_type(five_prime: u8, three_prime: u8) -> Option<PairType> {
    match (five_prime, three_prime) {
        (b'C', b'G') => Some(PairType::CG),
        (b'G', b'C') => Some(PairType::GC),
        (b'G', b'U') => Some(PairType::GU),
        (b'U', b'G') => Some(PairType::UG),
        (b'A', b'U') => Some(PairType::AU),
        (b'U', b'A') => Some(PairType::UA),
        _ => None,
    }
}

/// Rows: outer pair (i, j). Columns: inner pair read 3'→5', i.e. (j-1, i+1).
const STACK: [[i32; 6]; 6] = [
    //  CG    GC    GU    UG    AU    UA
    [-240, -330, -210, -140, -210, -210], // CG
    [-330, -340, -250, -150, -220, -240], // GC
    [-210, -250, 130, -50, -140, -130],   // GU
    [-140, -150, -50, 30, -60, -100],     // UG
    [-210, -220, -140, -60, -110, -90],   // AU
    [-210, -240, -130, -100, -90, -130],  // UA
];

/// Energy of stacking `outer` = (i, j) on the inner pair whose reversed type
/// is `inner_reversed` = (j-1, i+1).
pub fn stack_energy(outer: PairType, inner_reversed: PairType) -> i32 {
    STACK[outer.index()][inner_reversed.index()]
}

/// Hairpin initiation for `size` unpaired bases. `None` below [`MIN_HAIRPIN`].
pub fn hairpin_energy(size: usize) -> Option<i32> {
    if size < MIN_HAIRPIN {
        return None;
    }
    if size < HAIRPIN.len() {
        return Some(HAIRPIN[size]);
    }
    let extra = LXC37 * (size as f64 / 9.0).ln();
    Some(HAIRPIN[9] + extra.round() as i32)
}

/// kcal/mol
pub fn thermal_energy(temperature_celsius: f64) -> f64 {
    GAS_CONSTANT * (temperature_celsius + ZERO_CELSIUS)
}
