use super::{AccMark, Acceptance, Automaton, Cube, Transition};

/// Explicit transition-based automaton with cube guards.
#[derive(Debug, Clone)]
pub struct TwaCube {
    aps: Vec<String>,
    acceptance: Acceptance,
    initial: u32,
    states: Vec<Vec<Transition>>,
}

impl TwaCube {
    pub fn new(aps: Vec<String>, acceptance: Acceptance) -> Self {
        debug_assert!(aps.len() <= super::MAX_APS);
        TwaCube {
            aps,
            acceptance,
            initial: 0,
            states: Vec::new(),
        }
    }

    pub fn new_state(&mut self) -> u32 {
        self.states.push(Vec::new());
        (self.states.len() - 1) as u32
    }

    pub fn set_initial(&mut self, state: u32) {
        debug_assert!((state as usize) < self.states.len());
        self.initial = state;
    }

    pub fn create_transition(&mut self, src: u32, guard: Cube, mark: AccMark, dst: u32) {
        debug_assert!((src as usize) < self.states.len());
        debug_assert!((dst as usize) < self.states.len());
        self.states[src as usize].push(Transition { guard, mark, dst });
    }

    /// Büchi automaton for `F ap`: waits in state 0 until `ap` holds, then
    /// loops forever on an accepting edge.
    pub fn eventually(aps: Vec<String>, ap: usize) -> Self {
        let mut twa = TwaCube::new(aps, Acceptance::buchi());
        let waiting = twa.new_state();
        let done = twa.new_state();
        twa.set_initial(waiting);
        twa.create_transition(waiting, Cube::top().with_false(ap), AccMark::empty(), waiting);
        twa.create_transition(waiting, Cube::top().with_true(ap), AccMark::empty(), done);
        twa.create_transition(done, Cube::top(), AccMark::from_sets(&[0]), done);
        twa
    }

    /// Büchi automaton for `G F ap`: accepting whenever `ap` holds.
    pub fn infinitely_often(aps: Vec<String>, ap: usize) -> Self {
        let mut twa = TwaCube::new(aps, Acceptance::buchi());
        let s = twa.new_state();
        twa.set_initial(s);
        twa.create_transition(s, Cube::top().with_true(ap), AccMark::from_sets(&[0]), s);
        twa.create_transition(s, Cube::top().with_false(ap), AccMark::empty(), s);
        twa
    }

    /// One-state automaton accepting every infinite run (`t` acceptance).
    pub fn universal(aps: Vec<String>) -> Self {
        let mut twa = TwaCube::new(aps, Acceptance::generalized_buchi(0));
        let s = twa.new_state();
        twa.set_initial(s);
        twa.create_transition(s, Cube::top(), AccMark::empty(), s);
        twa
    }
}

impl Automaton for TwaCube {
    fn initial(&self) -> u32 {
        self.initial
    }

    fn succ(&self, state: u32) -> &[Transition] {
        self.states
            .get(state as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }

    fn ap(&self) -> &[String] {
        &self.aps
    }

    fn num_states(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventually_shape() {
        let twa = TwaCube::eventually(vec!["p".into()], 0);
        assert_eq!(twa.num_states(), 2);
        assert_eq!(twa.initial(), 0);
        assert_eq!(twa.succ(0).len(), 2);
        assert_eq!(twa.succ(1)[0].mark, AccMark::from_sets(&[0]));
        assert!(twa.succ(7).is_empty());
    }

    #[test]
    fn test_guard_selection() {
        let twa = TwaCube::eventually(vec!["p".into()], 0);
        let p_holds = Cube::valuation(1, 1);
        let matching: Vec<u32> = twa
            .succ(0)
            .iter()
            .filter(|t| t.guard.intersects(&p_holds))
            .map(|t| t.dst)
            .collect();
        assert_eq!(matching, vec![1]);
    }
}
