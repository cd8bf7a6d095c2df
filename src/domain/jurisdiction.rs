/// Page selector: the national aggregate or a single state/territory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Jurisdiction {
    Us,
    State(String),
}

impl Jurisdiction {
    /// Build a state selector from a path segment; codes are case-insensitive.
    pub fn state(code: &str) -> Self {
        Self::State(code.trim().to_uppercase())
    }

    /// Label embedded in the payload as `pageType`.
    pub fn page_type(&self) -> &str {
        match self {
            Jurisdiction::Us => "US",
            Jurisdiction::State(code) => code,
        }
    }
}
