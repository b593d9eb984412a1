/// Classic rule set: intelligent mean and relative stdev against the
/// rotational delay, plus a local-anomaly check for blocks with one sample.
use super::{Classifier, Search, Verdict};
use crate::stats::BlockStat;

/// Number of neighbouring blocks a lone sample is compared against
const NEIGHBOURS: usize = 5;

pub(crate) fn verdict(
    classifier: &Classifier,
    stats: &[BlockStat],
    index: usize,
    search: Search,
) -> Verdict {
    let block = &stats[index];
    if let Some(verdict) = classifier.screen(block, search) {
        return verdict;
    }

    let delay = classifier.thresholds().fast;
    let max_std_dev = classifier.max_std_dev;
    let flagged = if search.certain_bad {
        Verdict::Bad
    } else {
        Verdict::Uncertain
    };

    if !search.certain_bad && block.int_rel_stdev() <= max_std_dev {
        return Verdict::Fine;
    }
    if !search.soft_delay && block.max() < delay {
        return Verdict::Fine;
    }
    if block.int_average() > delay || block.int_rel_stdev() > max_std_dev {
        return flagged;
    }

    if block.count() == 1 {
        if let Some(baseline) = neighbour_average(stats, index) {
            if block.average() > baseline * classifier.tuning().neighbour_multiplier {
                return flagged;
            }
        }
    }
    Verdict::Fine
}

/// Mean of the neighbourhood averages around `index`.
///
/// Near the start the next five blocks are used, near the end the previous
/// five, elsewhere three before and two after. Blocks without samples are
/// left out; `None` if nothing is left.
pub(crate) fn neighbour_average(stats: &[BlockStat], index: usize) -> Option<f64> {
    let len = stats.len();
    let window: Vec<usize> = if index < 4 {
        (index + 1..=index + NEIGHBOURS).collect()
    } else if index + 3 > len {
        (index.saturating_sub(NEIGHBOURS)..index).collect()
    } else {
        (index - 3..index).chain(index + 1..=index + 2).collect()
    };

    let averages: Vec<f64> = window
        .into_iter()
        .filter_map(|i| stats.get(i))
        .filter(|b| b.is_initialized() && b.count() > 0)
        .map(BlockStat::average)
        .collect();
    if averages.is_empty() {
        return None;
    }
    Some(averages.iter().sum::<f64>() / averages.len() as f64)
}
