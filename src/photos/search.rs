//! Turns a free-text query into parameter-bound candidate-ID sub-queries.
//!
//! Each token compiles independently and the final candidate set is the
//! INTERSECT of all of them, so a photo must satisfy every token.

use rusqlite::types::Value;

/// Tokens beyond this count are ignored, not an error.
pub const MAX_SEARCH_TOKENS: usize = 6;

/// One search token, classified by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `@name` — exact, case-insensitive owner name match.
    OwnerExact(String),
    /// `#tag` — exact, case-insensitive tag name match.
    TagExact(String),
    /// Bare word — substring match on title, owner name or tag name.
    Fuzzy(String),
}

/// Tokenize and classify a query string. An empty result means
/// "no search performed", which callers must treat as distinct from
/// a search with zero hits.
pub fn parse_query(query: &str) -> Vec<Predicate> {
    query
        .split_whitespace()
        .filter_map(|token| {
            if let Some(name) = token.strip_prefix('@') {
                (!name.is_empty()).then(|| Predicate::OwnerExact(name.to_string()))
            } else if let Some(name) = token.strip_prefix('#') {
                (!name.is_empty()).then(|| Predicate::TagExact(name.to_string()))
            } else {
                Some(Predicate::Fuzzy(token.to_string()))
            }
        })
        .take(MAX_SEARCH_TOKENS)
        .collect()
}

/// A compiled search: the INTERSECT of one candidate-ID sub-query per
/// predicate, plus the bound parameter values in ?1..?N order.
#[derive(Debug)]
pub struct CompiledSearch {
    candidates: String,
    params: Vec<Value>,
}

pub fn compile(predicates: &[Predicate]) -> CompiledSearch {
    let mut clauses = Vec::with_capacity(predicates.len());
    let mut params = Vec::with_capacity(predicates.len());

    for predicate in predicates {
        let n = params.len() + 1;
        match predicate {
            Predicate::OwnerExact(name) => {
                clauses.push(format!(
                    "SELECT p.id FROM photos p \
                     JOIN users u ON u.id = p.owner_id \
                     WHERE LOWER(u.name) = ?{n}"
                ));
                params.push(Value::Text(name.to_lowercase()));
            }
            Predicate::TagExact(name) => {
                clauses.push(format!(
                    "SELECT p.id FROM photos p \
                     JOIN photo_tags pt ON pt.photo_id = p.id \
                     JOIN tags t ON t.id = pt.tag_id \
                     WHERE LOWER(t.name) = ?{n}"
                ));
                params.push(Value::Text(name.to_lowercase()));
            }
            Predicate::Fuzzy(word) => {
                clauses.push(format!(
                    "SELECT DISTINCT p.id FROM photos p \
                     JOIN users u ON u.id = p.owner_id \
                     LEFT JOIN photo_tags pt ON pt.photo_id = p.id \
                     LEFT JOIN tags t ON t.id = pt.tag_id \
                     WHERE LOWER(p.title) LIKE ?{n} \
                     OR LOWER(u.name) LIKE ?{n} \
                     OR LOWER(t.name) LIKE ?{n}"
                ));
                params.push(Value::Text(format!("%{}%", word.to_lowercase())));
            }
        }
    }

    CompiledSearch {
        candidates: clauses.join(" INTERSECT "),
        params,
    }
}

impl CompiledSearch {
    /// Cardinality of the candidate intersection.
    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM ({}) q", self.candidates)
    }

    /// One page of matching photos, best score first, newest breaking ties.
    pub fn page_sql(&self) -> String {
        let n = self.params.len();
        format!(
            "SELECT id, owner_id, created_at, title, filename, up_votes, down_votes \
             FROM photos WHERE id IN ({}) \
             ORDER BY (up_votes - down_votes) DESC, created_at DESC \
             LIMIT ?{} OFFSET ?{}",
            self.candidates,
            n + 1,
            n + 2
        )
    }

    pub fn params(&self) -> Vec<Value> {
        self.params.clone()
    }

    pub fn params_with_page(&self, limit: i64, offset: i64) -> Vec<Value> {
        let mut params = self.params.clone();
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));
        params
    }
}
