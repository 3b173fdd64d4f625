use crate::model::{PlayerSummary, RankedPlayer};
use crate::players::Player;

/// Compute metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Summarize a regenerated table: fantasy point distribution plus the top `top_n` players.
pub fn summarize_players(players: &[Player], top_n: usize) -> PlayerSummary {
    let fps: Vec<f64> = players.iter().map(|p| p.fantasy_points).collect();
    let metrics = compute_metrics(&fps);

    let mut ranked: Vec<&Player> = players.iter().collect();
    // Stable sort keeps input order on ties.
    ranked.sort_by(|a, b| b.fantasy_points.total_cmp(&a.fantasy_points));
    let top = ranked
        .into_iter()
        .take(top_n)
        .map(|p| RankedPlayer {
            name: p.name.clone(),
            team: p.team.clone(),
            fantasy_points: p.fantasy_points,
        })
        .collect();

    PlayerSummary {
        count: players.len(),
        fantasy_mean: metrics.map(|m| m.0),
        fantasy_median: metrics.map(|m| m.1),
        fantasy_p25: metrics.map(|m| m.2),
        fantasy_p75: metrics.map(|m| m.3),
        top,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::PlayerTable;

    #[test]
    fn metrics_need_two_samples() {
        assert!(compute_metrics(&[]).is_none());
        assert!(compute_metrics(&[1.0]).is_none());
        let (mean, median, p25, p75) = compute_metrics(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(mean, 2.5);
        assert_eq!(median, 3.0);
        assert_eq!(p25, 2.0);
        assert_eq!(p75, 4.0);
    }

    #[test]
    fn top_players_sorted_by_fantasy_points() {
        let csv = "Name,Team,g,pts\nLow,AAA,1,5\nHigh,BBB,1,50\nMid,CCC,1,20\nTie,DDD,1,20\n";
        let players = PlayerTable::from_csv(csv).unwrap().players();
        let summary = summarize_players(&players, 3);
        assert_eq!(summary.count, 4);
        let names: Vec<&str> = summary.top.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["High", "Mid", "Tie"]);
        assert!(summary.fantasy_mean.is_some());
    }
}
