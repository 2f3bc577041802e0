use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormat {
    Count,
    Percent,
    Supply,
}

impl MetricFormat {
    /// Render a value for display.
    ///
    /// Counts are rounded and grouped by thousands, percentages carry two
    /// decimals, supply amounts (in tez) are scaled to K or M.
    pub fn render(self, value: f64) -> String {
        match self {
            MetricFormat::Count => group_decimal(value.round(), 0),
            MetricFormat::Percent => format!("{:.2}%", value),
            MetricFormat::Supply => {
                let magnitude = value.abs();
                if magnitude >= 1_000_000.0 {
                    format!("{}M ꜩ", group_decimal(value / 1_000_000.0, 2))
                } else if magnitude >= 1_000.0 {
                    format!("{}K ꜩ", group_decimal(value / 1_000.0, 2))
                } else {
                    format!("{} ꜩ", group_decimal(value, 2))
                }
            }
        }
    }
}

fn group_decimal(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Change of one tracked metric since the previous visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMetric {
    pub key: String,
    pub label: String,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
    pub percent_change: f64,
    pub direction: Direction,
    pub format: MetricFormat,
}
