use std::fmt;

/// Mood shown next to the balance, by return on the initial balance
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Emotion {
    Ecstatic,
    Happy,
    Manic,
    Neutral,
    Sad,
    Depressed,
    Miserable,
}

/// Checked top to bottom; first threshold at or below the return wins
const TABLE: [(f64, Emotion); 7] = [
    (0.5, Emotion::Ecstatic),
    (0.2, Emotion::Happy),
    (0.05, Emotion::Manic),
    (-0.05, Emotion::Neutral),
    (-0.2, Emotion::Sad),
    (-0.5, Emotion::Depressed),
    (-999.0, Emotion::Miserable),
];

impl Emotion {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ecstatic => "ECSTATIC",
            Self::Happy => "HAPPY",
            Self::Manic => "MANIC",
            Self::Neutral => "NEUTRAL",
            Self::Sad => "SAD",
            Self::Depressed => "DEPRESSED",
            Self::Miserable => "MISERABLE",
        }
    }

    pub fn face(self) -> &'static str {
        match self {
            Self::Ecstatic => "🤩",
            Self::Happy => "😄",
            Self::Manic => "😜",
            Self::Neutral => "😐",
            Self::Sad => "😢",
            Self::Depressed => "😞",
            Self::Miserable => "😭",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn emotion_for_balance(init_balance: f64, balance: f64) -> Emotion {
    let pct = (balance - init_balance) / init_balance;
    if !pct.is_finite() {
        return Emotion::Miserable;
    }
    TABLE
        .iter()
        .find(|(threshold, _)| pct >= *threshold)
        .map(|(_, e)| *e)
        .unwrap_or(Emotion::Miserable)
}
