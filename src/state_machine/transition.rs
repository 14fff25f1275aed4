use super::StateDocument;

/// Guard strategy attached to a transition. Guards are pure predicates over
/// the document snapshot; anything effectful belongs in transition hooks.
pub enum Guard<D: StateDocument> {
    None,
    Predicate(fn(&D) -> bool),
}

impl<D: StateDocument> Guard<D> {
    pub fn check(&self, doc: &D) -> bool {
        match self {
            Guard::None => true,
            Guard::Predicate(p) => p(doc),
        }
    }
}

/// One allowed `(from, to)` edge, optionally protected by an ability (checked
/// through the authorization gate) and a guard predicate.
pub struct Transition<D: StateDocument> {
    pub from: D::Status,
    pub to: D::Status,
    pub ability: Option<&'static str>,
    pub guard: Guard<D>,
}

impl<D: StateDocument> Transition<D> {
    pub fn new(from: D::Status, to: D::Status) -> Self {
        Self {
            from,
            to,
            ability: None,
            guard: Guard::None,
        }
    }

    pub fn ability(mut self, ability: &'static str) -> Self {
        self.ability = Some(ability);
        self
    }

    pub fn guard(mut self, predicate: fn(&D) -> bool) -> Self {
        self.guard = Guard::Predicate(predicate);
        self
    }
}

/// Static, per-document-type declaration of the allowed status graph.
pub struct TransitionTable<D: StateDocument> {
    transitions: Vec<Transition<D>>,
}

impl<D: StateDocument> TransitionTable<D> {
    pub fn new(transitions: Vec<Transition<D>>) -> Self {
        Self { transitions }
    }

    pub fn find(&self, from: D::Status, to: D::Status) -> Option<&Transition<D>> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.to == to)
    }

    /// All transitions leaving `from`, in declaration order.
    pub fn leaving(&self, from: D::Status) -> impl Iterator<Item = &Transition<D>> {
        self.transitions.iter().filter(move |t| t.from == from)
    }
}
