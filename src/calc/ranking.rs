use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Lower is better (GWA on the 1.00..5.00 scale).
    Ascending,
    /// Higher is better (percentages, points).
    Descending,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    /// Every row gets its own position.
    #[default]
    Ordinal,
    /// Equal scores share a rank, no gaps.
    Dense,
}

impl RankingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordinal" => Some(Self::Ordinal),
            "dense" => Some(Self::Dense),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinal => "ordinal",
            Self::Dense => "dense",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub identity: T,
    pub score: Option<f64>,
}

impl<T> Scored<T> {
    pub fn new(identity: T, score: Option<f64>) -> Self {
        Self {
            identity,
            score: score.filter(|s| s.is_finite()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity<T> {
    pub identity: T,
    pub score: Option<f64>,
    pub rank: u32,
}

/// Where the viewer stands. Ranks use 0 for "not ranked".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerStanding {
    /// Rank over the whole unfiltered cohort.
    pub rank: u32,
    /// Rank inside the filtered view.
    pub filtered_rank: u32,
    pub in_window: bool,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard<T> {
    /// Filtered, sorted and truncated to the requested window.
    pub rows: Vec<RankedEntity<T>>,
    /// Rows in the filtered view before truncation.
    pub total: usize,
    pub viewer: Option<ViewerStanding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingEngine {
    pub direction: SortDirection,
    pub mode: RankingMode,
}

impl RankingEngine {
    pub fn new(direction: SortDirection) -> Self {
        Self {
            direction,
            mode: RankingMode::Ordinal,
        }
    }

    pub fn with_mode(mut self, mode: RankingMode) -> Self {
        self.mode = mode;
        self
    }

    fn compare(&self, a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                match self.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
            // Unscored rows trail in both directions.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn rank_all<T: Clone>(&self, entities: &[Scored<T>]) -> Vec<RankedEntity<T>> {
        self.rank(entities, |_| true)
    }

    /// Filter, stable-sort by score and number the result from 1.
    pub fn rank<T, F>(&self, entities: &[Scored<T>], filter: F) -> Vec<RankedEntity<T>>
    where
        T: Clone,
        F: Fn(&T) -> bool,
    {
        let mut kept: Vec<&Scored<T>> = entities.iter().filter(|e| filter(&e.identity)).collect();
        kept.sort_by(|a, b| self.compare(a.score, b.score));

        let mut out: Vec<RankedEntity<T>> = Vec::with_capacity(kept.len());
        let mut dense_rank = 0_u32;
        let mut prev: Option<Option<f64>> = None;
        for (idx, e) in kept.into_iter().enumerate() {
            let rank = match self.mode {
                RankingMode::Ordinal => (idx as u32) + 1,
                RankingMode::Dense => {
                    let same = prev
                        .map(|p| self.compare(p, e.score) == Ordering::Equal)
                        .unwrap_or(false);
                    if !same {
                        dense_rank += 1;
                    }
                    prev = Some(e.score);
                    dense_rank
                }
            };
            out.push(RankedEntity {
                identity: e.identity.clone(),
                score: e.score,
                rank,
            });
        }
        out
    }

    /// Ranked view limited to `window` rows, plus the viewer's standing. The
    /// viewer's rank is taken from the full unfiltered cohort so callers can
    /// still show it when the viewer falls outside the window.
    pub fn leaderboard<T, F, V>(
        &self,
        entities: &[Scored<T>],
        filter: F,
        window: Option<usize>,
        is_viewer: V,
    ) -> Leaderboard<T>
    where
        T: Clone,
        F: Fn(&T) -> bool,
        V: Fn(&T) -> bool,
    {
        let mut rows = self.rank(entities, filter);
        let total = rows.len();

        let filtered_rank = rank_where(&rows, &is_viewer);
        let overall = self.rank_all(entities);
        let viewer = overall
            .iter()
            .find(|r| is_viewer(&r.identity))
            .map(|r| ViewerStanding {
                rank: r.rank,
                filtered_rank,
                in_window: filtered_rank > 0
                    && window.map(|w| (filtered_rank as usize) <= w).unwrap_or(true),
                score: r.score,
            });

        if let Some(w) = window {
            rows.truncate(w);
        }
        Leaderboard {
            rows,
            total,
            viewer,
        }
    }
}

/// Rank of the first row matching `pred`, or 0 when absent.
pub fn rank_where<T, P>(ranked: &[RankedEntity<T>], pred: P) -> u32
where
    P: Fn(&T) -> bool,
{
    ranked
        .iter()
        .find(|r| pred(&r.identity))
        .map(|r| r.rank)
        .unwrap_or(0)
}
