use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::queue::QueueItem;

pub type OrderingStrategy = Box<dyn Fn(Vec<QueueItem>) -> Vec<QueueItem>>;

pub fn preserve() -> OrderingStrategy {
    Box::new(|items| items)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    // Nulls last; otherwise ascending by millisecond timestamp.
    ByDueDate,
    // Ascending by (deck_path, file_position).
    ByFilePosition,
}

pub fn sort_by(key: SortKey) -> OrderingStrategy {
    Box::new(move |mut items| {
        match key {
            SortKey::ByDueDate => {
                items.sort_by(|a, b| match (a.due_date, b.due_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                });
            }
            SortKey::ByFilePosition => {
                items.sort_by(|a, b| (&a.deck_path, a.file_position).cmp(&(&b.deck_path, b.file_position)));
            }
        }
        items
    })
}

pub fn shuffle(rng: SmallRng) -> OrderingStrategy {
    let rng = std::cell::RefCell::new(rng);
    Box::new(move |mut items| {
        items.shuffle(&mut *rng.borrow_mut());
        items
    })
}

pub fn chain(strategies: Vec<OrderingStrategy>) -> OrderingStrategy {
    Box::new(move |items| strategies.iter().fold(items, |acc, s| s(acc)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primary {
    NewFirst,
    DueFirst,
}

pub struct QueueOrderSpec {
    pub primary: Primary,
    pub new_card_order: OrderingStrategy,
    pub due_card_order: OrderingStrategy,
}

impl QueueOrderSpec {
    pub fn into_strategy(self) -> OrderingStrategy {
        Box::new(move |items| {
            let (new_items, due_items): (Vec<_>, Vec<_>) =
                items.into_iter().partition(|i| matches!(i.category, crate::queue::Category::New));
            let new_items = (self.new_card_order)(new_items);
            let due_items = (self.due_card_order)(due_items);
            match self.primary {
                Primary::NewFirst => new_items.into_iter().chain(due_items).collect(),
                Primary::DueFirst => due_items.into_iter().chain(new_items).collect(),
            }
        })
    }
}

pub fn new_first_by_due_date() -> OrderingStrategy {
    QueueOrderSpec { primary: Primary::NewFirst, new_card_order: preserve(), due_card_order: sort_by(SortKey::ByDueDate) }
        .into_strategy()
}

pub fn due_first_by_due_date() -> OrderingStrategy {
    QueueOrderSpec { primary: Primary::DueFirst, new_card_order: preserve(), due_card_order: sort_by(SortKey::ByDueDate) }
        .into_strategy()
}

pub fn new_first_shuffled(rng: SmallRng) -> OrderingStrategy {
    QueueOrderSpec { primary: Primary::NewFirst, new_card_order: shuffle(rng), due_card_order: sort_by(SortKey::ByDueDate) }
        .into_strategy()
}

pub fn new_first_file_order() -> OrderingStrategy {
    QueueOrderSpec {
        primary: Primary::NewFirst,
        new_card_order: sort_by(SortKey::ByFilePosition),
        due_card_order: sort_by(SortKey::ByDueDate),
    }
    .into_strategy()
}

pub fn shuffled_ordering(rng: SmallRng) -> OrderingStrategy {
    shuffle(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Category;
    use rand::SeedableRng;

    fn item(deck_path: &str, file_position: usize, category: Category, due_date: Option<chrono::DateTime<chrono::Utc>>) -> QueueItem {
        QueueItem {
            deck_path: deck_path.into(),
            deck_name: "deck".into(),
            relative_path: "deck.md".into(),
            item_index: 0,
            card: crate::metadata::Metadata::new_card(format!("{}-{}", deck_path, file_position)),
            card_index: 0,
            file_position,
            category,
            due_date,
        }
    }

    #[test]
    fn preserve_is_identity() {
        let items = vec![item("a", 0, Category::New, None), item("b", 1, Category::New, None)];
        let ordered = preserve()(items.clone());
        assert_eq!(ordered, items);
    }

    #[test]
    fn sort_by_due_date_puts_nulls_last() {
        let now: chrono::DateTime<chrono::Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let items = vec![
            item("a", 0, Category::Due, None),
            item("b", 1, Category::Due, Some(now)),
        ];
        let ordered = sort_by(SortKey::ByDueDate)(items);
        assert_eq!(ordered[0].due_date, Some(now));
        assert_eq!(ordered[1].due_date, None);
    }

    #[test]
    fn shuffle_is_deterministic_given_seed() {
        let items: Vec<QueueItem> = (0..10).map(|i| item("a", i, Category::New, None)).collect();
        let a = shuffle(SmallRng::seed_from_u64(42))(items.clone());
        let b = shuffle(SmallRng::seed_from_u64(42))(items);
        assert_eq!(a, b);
    }

    #[test]
    fn chain_composes_left_to_right() {
        let items = vec![item("a", 0, Category::New, None)];
        let ordered = chain(vec![preserve(), preserve()])(items.clone());
        assert_eq!(ordered, items);
    }
}
