//! Property-based test generators using proptest.
//!
//! Strategies produce values that fit the sample schema, so generated
//! entities can be persisted and read back unchanged.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Generates a person name: a capitalised word, optionally two.
pub fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,11}( [A-Z][a-z]{1,11})?").expect("valid regex")
}

/// Generates a book title.
pub fn arb_title() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,9}( [a-z]{1,9}){0,4}").expect("valid regex")
}

/// Generates a price with two decimal places between 0.00 and 999.99.
pub fn arb_price() -> impl Strategy<Value = Decimal> {
    (0i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generates a date between 1900-01-01 and 2099-12-28.
pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (1900i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
}

/// The values of one generated book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSpec {
    /// Title.
    pub title: String,
    /// Price, if any.
    pub price: Option<Decimal>,
}

/// Generates a book.
pub fn arb_book() -> impl Strategy<Value = BookSpec> {
    (arb_title(), prop::option::of(arb_price())).prop_map(|(title, price)| BookSpec { title, price })
}

/// Generates up to `max` books.
pub fn arb_books(max: usize) -> impl Strategy<Value = Vec<BookSpec>> {
    prop::collection::vec(arb_book(), 0..=max)
}

/// The values of one generated author and their books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSpec {
    /// Name.
    pub name: String,
    /// Birth date, if known.
    pub born: Option<NaiveDate>,
    /// Books written.
    pub books: Vec<BookSpec>,
}

/// Generates an author with up to `max_books` books.
pub fn arb_author(max_books: usize) -> impl Strategy<Value = AuthorSpec> {
    (arb_name(), prop::option::of(arb_date()), arb_books(max_books))
        .prop_map(|(name, born, books)| AuthorSpec { name, born, books })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prices_have_two_places(price in arb_price()) {
            prop_assert_eq!(price.scale(), 2);
            prop_assert!(price >= Decimal::ZERO);
        }

        #[test]
        fn titles_are_not_empty(title in arb_title()) {
            prop_assert!(!title.is_empty());
            prop_assert!(!title.ends_with(' '));
        }

        #[test]
        fn authors_respect_book_limit(author in arb_author(3)) {
            prop_assert!(author.books.len() <= 3);
            prop_assert!(!author.name.is_empty());
        }
    }
}
