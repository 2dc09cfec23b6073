//! Harmonic index arithmetic
//!
//! Three flat index spaces are used by the mixer:
//!
//! - balance space: junction `j`, LO harmonic `h` in `0..=H`
//! - junction space: junction `j`, sideband `m` in `-H..=H`
//! - mixer port space: linear-circuit port `p` at sideband `m`. The IF
//!   circuit supplies the ports of sideband 0, the RF circuit those of every
//!   other sideband, ordered `-H..-1, 1..H`.

/// Index layout of a mixer with `junctions` junctions and `harmonics` LO
/// harmonics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmonicPorts {
    pub junctions: usize,
    pub harmonics: usize,
    /// Open IF circuit ports (beyond the junction ports)
    pub if_ports: usize,
    /// Open RF circuit ports exposed by the mixer
    pub rf_ports: usize,
}

impl HarmonicPorts {
    pub fn new(junctions: usize, harmonics: usize, if_ports: usize, rf_ports: usize) -> Self {
        Self {
            junctions,
            harmonics,
            if_ports,
            rf_ports,
        }
    }

    /// Number of sidebands, 2H + 1
    pub fn sidebands(&self) -> usize {
        2 * self.harmonics + 1
    }

    /// Sidebands in ascending order
    pub fn sideband_range(&self) -> std::ops::RangeInclusive<i32> {
        let h = self.harmonics as i32;
        -h..=h
    }

    /// Size of the balance space, J (H + 1)
    pub fn balance_size(&self) -> usize {
        self.junctions * (self.harmonics + 1)
    }

    pub fn balance_index(&self, junction: usize, harmonic: usize) -> usize {
        debug_assert!(junction < self.junctions && harmonic <= self.harmonics);
        junction * (self.harmonics + 1) + harmonic
    }

    /// Size of the junction space, J (2H + 1)
    pub fn junction_size(&self) -> usize {
        self.junctions * self.sidebands()
    }

    pub fn junction_index(&self, junction: usize, sideband: i32) -> usize {
        debug_assert!(sideband.unsigned_abs() as usize <= self.harmonics);
        junction * self.sidebands() + (sideband + self.harmonics as i32) as usize
    }

    /// Index of an offset `m` into a (2H+1)-sized harmonic vector or matrix
    pub fn offset(&self, sideband: i32) -> usize {
        (sideband + self.harmonics as i32) as usize
    }

    /// Number of mixer ports
    pub fn size(&self) -> usize {
        self.if_ports + 2 * self.harmonics * self.rf_ports
    }

    /// Ports of the linear circuit serving `sideband`
    pub fn ports_at(&self, sideband: i32) -> usize {
        if sideband == 0 {
            self.if_ports
        } else {
            self.rf_ports
        }
    }

    fn ordinal(&self, sideband: i32) -> usize {
        let h = self.harmonics as i32;
        if sideband < 0 {
            (sideband + h) as usize
        } else {
            (sideband + h - 1) as usize
        }
    }

    /// Mixer port of linear port `port` at `sideband`
    pub fn port_index(&self, port: usize, sideband: i32) -> Option<usize> {
        if sideband.unsigned_abs() as usize > self.harmonics || port >= self.ports_at(sideband) {
            return None;
        }
        if sideband == 0 {
            Some(port)
        } else {
            Some(self.if_ports + self.rf_ports * self.ordinal(sideband) + port)
        }
    }

    /// Linear port and sideband of mixer port `index`
    pub fn port_of(&self, index: usize) -> Option<(usize, i32)> {
        if index >= self.size() {
            return None;
        }
        if index < self.if_ports {
            return Some((index, 0));
        }
        let rest = index - self.if_ports;
        let ordinal = (rest / self.rf_ports) as i32;
        let h = self.harmonics as i32;
        let sideband = if ordinal < h { ordinal - h } else { ordinal - h + 1 };
        Some((rest % self.rf_ports, sideband))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        let p = HarmonicPorts::new(2, 3, 1, 2);
        assert_eq!(p.sidebands(), 7);
        assert_eq!(p.balance_size(), 8);
        assert_eq!(p.junction_size(), 14);
        assert_eq!(p.size(), 1 + 12);
        assert_eq!(p.balance_index(1, 0), 4);
        assert_eq!(p.junction_index(1, -3), 7);
        assert_eq!(p.junction_index(0, 3), 6);
    }

    #[test]
    fn test_port_map_round_trip() {
        let p = HarmonicPorts::new(1, 2, 2, 3);
        let mut seen = vec![false; p.size()];
        for m in p.sideband_range() {
            for port in 0..p.ports_at(m) {
                let idx = p.port_index(port, m).unwrap();
                assert!(!seen[idx]);
                seen[idx] = true;
                assert_eq!(p.port_of(idx), Some((port, m)));
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(p.port_index(2, 0), None);
        assert_eq!(p.port_index(0, 3), None);
        assert_eq!(p.port_of(p.size()), None);
    }

    #[test]
    fn test_sideband_order() {
        let p = HarmonicPorts::new(1, 2, 1, 1);
        assert_eq!(p.port_index(0, 0), Some(0));
        assert_eq!(p.port_index(0, -2), Some(1));
        assert_eq!(p.port_index(0, -1), Some(2));
        assert_eq!(p.port_index(0, 1), Some(3));
        assert_eq!(p.port_index(0, 2), Some(4));
    }

    #[test]
    fn test_rf_terminated_layout() {
        let p = HarmonicPorts::new(1, 2, 1, 0);
        assert_eq!(p.size(), 1);
        assert_eq!(p.port_index(0, 1), None);
        assert_eq!(p.port_of(0), Some((0, 0)));
    }
}
