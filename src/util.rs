use std::fs::File;
use std::io::Read;
use std::process;

#[cfg(not(target_os = "linux"))]
pub fn mem_used_peak() -> Option<usize> {
    None
}

#[cfg(target_os = "linux")]
pub fn mem_used_peak() -> Option<usize> {
    let mut buf = String::new();
    let mut stats = File::open(&format!("/proc/{}/status", process::id())).ok()?;
    stats.read_to_string(&mut buf).ok()?;
    let line = buf.lines().find(|line| line.starts_with("VmPeak:"))?;
    let mem_kb: String = line.chars().filter(|c| c.is_digit(10)).collect();
    mem_kb.parse().ok()
}

/// A linear-congruential generator matching the one the original
/// accelerator model uses for `random_var_freq`/`rnd_init_act` and for
/// shuffling the classic heap at `init_heap`. Kept as a plain LCG (rather
/// than pulling in `rand`) since its exact bit-for-bit sequence is part of
/// the decision trace the original model produces.
pub struct Random {
    seed: f64,
}

impl Random {
    pub fn new(seed: f64) -> Random {
        assert!(seed != 0.0, "Random seed must never be 0");
        Random { seed }
    }

    /// Returns a random float 0 <= x < 1.
    pub fn drand(&mut self) -> f64 {
        self.seed *= 1389796.0;
        let q = (self.seed / 2147483647.0) as i32;
        self.seed -= (q as f64) * 2147483647.0;
        self.seed / 2147483647.0
    }

    /// Returns a random integer 0 <= x < size.
    pub fn irand(&mut self, size: usize) -> usize {
        (self.drand() * (size as f64)) as usize
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.drand() < p
    }
}

/// Luby restart sequence: `1,1,2,1,1,2,4,1,1,2,1,1,2,4,8,...`, scaled by
/// `y` (§4.1 restart schedule).
pub fn luby(y: f64, mut x: u32) -> f64 {
    let mut size = 1;
    let mut seq = 0;

    while size < x + 1 {
        seq += 1;
        size = 2 * size + 1;
    }

    while size - 1 != x {
        size = (size - 1) >> 1;
        seq -= 1;
        x %= size;
    }

    y.powi(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luby_matches_known_prefix() {
        let seq: Vec<u32> = (0..8).map(|x| luby(1.0, x) as u32).collect();
        assert_eq!(seq, vec![1, 1, 2, 1, 1, 2, 4, 1]);
    }

    #[test]
    fn random_is_deterministic_for_a_given_seed() {
        let mut a = Random::new(42.0);
        let mut b = Random::new(42.0);
        for _ in 0..16 {
            assert_eq!(a.drand(), b.drand());
        }
    }
}
