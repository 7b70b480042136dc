use std::fmt;

pub fn bite(quantity: usize) -> UnitFormatter {
    UnitFormatter::new(quantity as f64, 1024, 0, IEC_PREFIXES, "B")
}

pub fn ns(quantity: u64) -> UnitFormatter {
    UnitFormatter::new(quantity as f64, 1000, 0, SI_PREFIXES, "s")
}

pub fn short_scale(quantity: f64) -> UnitFormatter {
    UnitFormatter::new(quantity, 1000, 0, SHORT_SCALE, "")
}

/// Formats a quantity with the largest prefix that keeps it within the requested number of significant figures
/// (precision, default 3).
pub struct UnitFormatter {
    quantity: f64,
    power: usize,
    ratio: usize,
    prefixes: &'static [&'static str],
    suffix: &'static str,
}

impl UnitFormatter {
    pub fn new(quantity: f64,
               ratio: usize,
               power: usize,
               prefixes: &'static [&'static str],
               suffix: &'static str) -> UnitFormatter {
        UnitFormatter { quantity, power, ratio, prefixes, suffix }
    }
}

impl fmt::Display for UnitFormatter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sig_figs = f.precision().unwrap_or(3);
        let mut i = self.power;
        let mut ratio = 1.0;
        while self.quantity / ratio < 1.0 && i > 0 {
            ratio /= self.ratio as f64;
            i -= 1;
        }
        while (self.quantity / ratio).log10() > sig_figs as f64 && i + 1 < self.prefixes.len() {
            ratio *= self.ratio as f64;
            i += 1;
        }
        let quantity = self.quantity / ratio;
        let digits = quantity.log10().floor() as isize + 1;
        let precision = if digits < 0 {
            sig_figs
        } else if digits < sig_figs as isize {
            (sig_figs as isize - digits) as usize
        } else {
            0
        };
        write!(f, "{:.prec$}{}{}", quantity, self.prefixes[i], self.suffix, prec = precision)
    }
}

/// Prefixes from nano upwards.
const SI_PREFIXES: &[&str] = &["n", "μ", "m", "", "k", "M", "G", "T"];

const IEC_PREFIXES: &[&str] = &["", "Ki", "Mi", "Gi", "Ti", "Pi"];

const SHORT_SCALE: &[&str] = &["", " thousand", " million", " billion", " trillion"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(&format!("{}", bite(53413)), "52.2KiB");
        assert_eq!(&format!("{:.2}", bite(1024 * 1024)), "1.0MiB");
        assert_eq!(&format!("{}", ns(1_500_000)), "1.50ms");
        assert_eq!(&format!("{}", ns(250)), "250ns");
        assert_eq!(&format!("{}", short_scale(2_500_000.0)), "2.50 million");
    }
}
