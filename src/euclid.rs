//! Euclidean rhythm generation
//!
//! Bjorklund's algorithm distributes `pulses` onsets as evenly as possible
//! over `steps` slots, matching the rhythms used by TidalCycles:
//! - E(3,8) -> x..x..x.
//! - E(5,8) -> x.xx.xx.
//!
//! Edge policy: `pulses == 0` gives all rests, `pulses >= steps` saturates
//! to all onsets, `steps == 0` gives an empty pattern. None of these error.

/// Generate a rotated Euclidean gate pattern of `steps` values (0 or 1).
///
/// `rotation` shifts the pattern to the right: `out[i] = base[(i - rotation) mod steps]`.
/// Negative rotations shift left.
pub fn euclid(pulses: usize, steps: usize, rotation: i64) -> Vec<i64> {
    let mut gates: Vec<i64> = bjorklund(pulses, steps)
        .into_iter()
        .map(i64::from)
        .collect();
    rotate(&mut gates, rotation);
    gates
}

/// Rotate a slice right by `n` places (left when `n` is negative).
pub fn rotate<T>(values: &mut [T], n: i64) {
    if values.is_empty() {
        return;
    }
    let len = values.len() as i64;
    let shift = n.rem_euclid(len) as usize;
    values.rotate_right(shift);
}

/// Unrotated Bjorklund distribution as 0/1 gates.
fn bjorklund(pulses: usize, steps: usize) -> Vec<u8> {
    if steps == 0 {
        return Vec::new();
    }
    if pulses >= steps {
        return vec![1; steps];
    }
    if pulses == 0 {
        return vec![0; steps];
    }

    // Pair up onset groups with rest groups until at most one leftover group remains
    let mut groups: Vec<Vec<u8>> = vec![vec![1]; pulses];
    let mut remainder: Vec<Vec<u8>> = vec![vec![0]; steps - pulses];

    while remainder.len() > 1 {
        let paired = groups.len().min(remainder.len());

        let leftover = if groups.len() > remainder.len() {
            groups.split_off(paired)
        } else {
            remainder.split_off(paired)
        };

        for (group, tail) in groups.iter_mut().zip(remainder.drain(..paired)) {
            group.extend(tail);
        }

        remainder = leftover;
    }

    groups.into_iter().chain(remainder).flatten().collect()
}
