use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Orders groups so every group follows its producers, and assigns each a
/// dependency wave. Ties resolve to creation order.
pub fn schedule(producers: &[BTreeSet<usize>]) -> (Vec<usize>, Vec<usize>) {
    let n = producers.len();
    let mut consumers = vec![Vec::new(); n];
    let mut pending: Vec<usize> = producers.iter().map(BTreeSet::len).collect();
    for (g, deps) in producers.iter().enumerate() {
        for &p in deps {
            consumers[p].push(g);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n).filter(|&g| pending[g] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(n);
    let mut wave = vec![0usize; n];
    while let Some(Reverse(g)) = ready.pop() {
        order.push(g);
        wave[g] = producers[g].iter().map(|&p| wave[p] + 1).max().unwrap_or(0);
        for &c in &consumers[g] {
            pending[c] -= 1;
            if pending[c] == 0 {
                ready.push(Reverse(c));
            }
        }
    }
    (order, wave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_groups_can_run_first() {
        // group 0 reads group 2, group 1 reads nothing, group 2 reads group 1
        let producers = vec![BTreeSet::from([2]), BTreeSet::new(), BTreeSet::from([1])];
        let (order, wave) = schedule(&producers);
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(wave, vec![2, 0, 1]);
    }

    #[test]
    fn independent_groups_share_a_wave() {
        let producers = vec![BTreeSet::new(), BTreeSet::new(), BTreeSet::from([0, 1])];
        let (order, wave) = schedule(&producers);
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(wave, vec![0, 0, 1]);
    }
}
