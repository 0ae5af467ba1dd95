use clap::ValueEnum;

/// Direction in which the catalog and the collections are traversed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Order {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl Order {
    /// Apply the order to a sequence stored oldest first
    pub fn apply<'a, T>(self, items: &'a [T]) -> Box<dyn Iterator<Item = &'a T> + 'a> {
        match self {
            Order::OldestFirst => Box::new(items.iter()),
            Order::NewestFirst => Box::new(items.iter().rev()),
        }
    }
}
