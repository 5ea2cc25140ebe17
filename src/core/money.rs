/// Money is an integer count of pence. Every multiplication or division by a
/// rate rounds to the nearest penny immediately; totals depend on this.
pub type Pence = i64;

pub fn to_pence(pounds: f64) -> Pence {
    (pounds * 100.0).round() as Pence
}

pub fn from_pence(amount: Pence) -> f64 {
    amount as f64 / 100.0
}

pub fn mul_rate(amount: Pence, rate: f64) -> Pence {
    (amount as f64 * rate).round() as Pence
}

pub fn div_rate(amount: Pence, divisor: f64) -> Pence {
    (amount as f64 / divisor).round() as Pence
}

/// One year of growth: balance x (1 + rate), rounded.
pub fn grow(amount: Pence, rate: f64) -> Pence {
    mul_rate(amount, 1.0 + rate)
}

pub fn clamp_non_negative(amount: Pence) -> Pence {
    amount.max(0)
}

pub fn format_gbp(amount: Pence) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let pounds = (abs / 100).to_string();
    let pence = abs % 100;

    let mut grouped = String::with_capacity(pounds.len() + pounds.len() / 3);
    for (idx, digit) in pounds.chars().enumerate() {
        if idx > 0 && (pounds.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}£{grouped}.{pence:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_pence_rounds_to_nearest_penny() {
        assert_eq!(to_pence(12_570.00), 1_257_000);
        assert_eq!(to_pence(0.005), 1);
        assert_eq!(to_pence(0.004), 0);
        assert_eq!(to_pence(0.0), 0);
    }

    #[test]
    fn mul_rate_rounds_half_up_for_positive_amounts() {
        assert_eq!(mul_rate(25, 0.5), 13);
        assert_eq!(mul_rate(1_257_000, 0.2), 251_400);
        assert_eq!(mul_rate(0, 0.2), 0);
    }

    #[test]
    fn div_rate_rounds_to_nearest() {
        assert_eq!(div_rate(1_257_000, 0.75), 1_676_000);
        assert_eq!(div_rate(2_748_600, 0.85), 3_233_647);
    }

    #[test]
    fn grow_applies_rate_once() {
        assert_eq!(grow(7_500_000, 0.04), 7_800_000);
        assert_eq!(grow(0, 0.04), 0);
        assert_eq!(grow(100, 0.0), 100);
    }

    #[test]
    fn format_gbp_groups_thousands() {
        assert_eq!(format_gbp(0), "£0.00");
        assert_eq!(format_gbp(1_257_000), "£12,570.00");
        assert_eq!(format_gbp(123_456_789), "£1,234,567.89");
        assert_eq!(format_gbp(-5), "-£0.05");
    }
}
