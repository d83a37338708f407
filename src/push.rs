//! Push patterns: how a source array is spread over a differently sized
//! destination array.

use hashbrown::HashMap;

/// Strategy mapping destination elements to source elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushPattern {
    /// Copy `min(S, D)` elements, no repetition.
    OneToOne,
    /// Tile the source across the destination until full.
    Repeat,
    /// Tile the source reversed.
    ReverseRepeat,
}

impl PushPattern {
    /// Source element for destination element `dst_index`, given
    /// `src_count` source elements. `None` ends the copy.
    #[inline]
    pub fn source_index(self, dst_index: usize, src_count: usize) -> Option<usize> {
        if src_count == 0 {
            return None;
        }
        match self {
            PushPattern::OneToOne => (dst_index < src_count).then_some(dst_index),
            PushPattern::Repeat => Some(dst_index % src_count),
            PushPattern::ReverseRepeat => Some(src_count - 1 - dst_index % src_count),
        }
    }
}

/// Index into a [`PushPatterns`] registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushPatternId(pub(crate) u16);

/// Named table of push patterns.
///
/// Every input pin is given [`PushPatterns::default_id`] when it gets
/// connected; [`Graph::set_push_pattern`](crate::Graph::set_push_pattern)
/// overrides it per pin.
#[derive(Clone, Debug)]
pub struct PushPatterns {
    patterns: Vec<(String, PushPattern)>,
    by_name: HashMap<String, PushPatternId>,
    default: PushPatternId,
}

impl PushPatterns {
    pub const ONE_TO_ONE: &'static str = "one-to-one";
    pub const REPEAT: &'static str = "repeat";
    pub const REVERSE_REPEAT: &'static str = "reverse-repeat";

    /// Registry with the three built-in patterns; one-to-one is the default.
    pub fn new() -> Self {
        let mut registry = Self {
            patterns: Vec::new(),
            by_name: HashMap::new(),
            default: PushPatternId(0),
        };
        registry.register(Self::ONE_TO_ONE, PushPattern::OneToOne);
        registry.register(Self::REPEAT, PushPattern::Repeat);
        registry.register(Self::REVERSE_REPEAT, PushPattern::ReverseRepeat);
        registry
    }

    /// Register (or re-register) a pattern under `name`.
    pub fn register(&mut self, name: &str, pattern: PushPattern) -> PushPatternId {
        if let Some(&id) = self.by_name.get(name) {
            self.patterns[id.0 as usize].1 = pattern;
            return id;
        }
        let id = PushPatternId(self.patterns.len() as u16);
        self.patterns.push((name.to_owned(), pattern));
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<PushPatternId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: PushPatternId) -> &str {
        &self.entry(id).0
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn get(&self, id: PushPatternId) -> PushPattern {
        self.entry(id).1
    }

    fn entry(&self, id: PushPatternId) -> &(String, PushPattern) {
        self.patterns
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("unregistered push pattern {:?}", id))
    }

    pub fn default_id(&self) -> PushPatternId {
        self.default
    }

    /// Change the default by name; returns `false` if no such pattern.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.id(name) {
            Some(id) => {
                self.default = id;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PushPatterns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(pattern: PushPattern, src: usize, dst: usize) -> Vec<usize> {
        (0..dst).map_while(|j| pattern.source_index(j, src)).collect()
    }

    #[test]
    fn builtin_plans() {
        assert_eq!(plan(PushPattern::OneToOne, 3, 5), vec![0, 1, 2]);
        assert_eq!(plan(PushPattern::OneToOne, 5, 2), vec![0, 1]);
        assert_eq!(plan(PushPattern::Repeat, 2, 5), vec![0, 1, 0, 1, 0]);
        assert_eq!(plan(PushPattern::ReverseRepeat, 3, 5), vec![2, 1, 0, 2, 1]);
        assert!(plan(PushPattern::Repeat, 0, 4).is_empty());
    }

    #[test]
    fn registry_lookup() {
        let mut patterns = PushPatterns::new();
        let default = patterns.default_id();
        assert_eq!(patterns.get(default), PushPattern::OneToOne);
        assert_eq!(patterns.name(default), PushPatterns::ONE_TO_ONE);

        assert!(patterns.set_default(PushPatterns::REPEAT));
        assert_eq!(patterns.get(patterns.default_id()), PushPattern::Repeat);
        assert!(!patterns.set_default("scatter"));
        assert_eq!(patterns.len(), 3);
    }

    #[test]
    #[should_panic(expected = "unregistered push pattern")]
    fn unknown_pattern_is_fatal() {
        PushPatterns::new().get(PushPatternId(99));
    }
}
