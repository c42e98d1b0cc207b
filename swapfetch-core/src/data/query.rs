//! Swap query description and GraphQL rendering.
//!
//! A `SwapQuery` names the fields to select (as dotted paths through the
//! subgraph's entity graph), the inclusive timestamp range and the row cap.
//! Rendering produces one page of the query; the session drives the cursor.

use super::window::TimeWindow;

/// Root collection queried on the subgraph.
pub const SWAP_ENTITY: &str = "swaps";

/// GraphQL type backing `SWAP_ENTITY`, used for schema discovery.
pub const SWAP_TYPE: &str = "Swap";

/// Default row cap per window.
pub const DEFAULT_QUERY_SIZE: usize = 250_000;

/// Fields selected when no explicit selection is configured.
pub const DEFAULT_SWAP_FIELDS: &[&str] = &[
    "timestamp",
    "transaction.id",
    "transaction.blockNumber",
    "transaction.timestamp",
    "sqrtPriceX96",
    "pool.id",
    "pool.liquidity",
    "pool.token0Price",
    "pool.token1Price",
    "recipient",
    "sender",
    "origin",
    "amount0",
    "amount1",
    "amountUSD",
    "token0.name",
    "token0.decimals",
    "token0.symbol",
    "token1.name",
    "token1.decimals",
    "token1.symbol",
];

/// A dotted path to a scalar field, e.g. `transaction.blockNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment: the field on the root entity.
    pub fn root(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Column header for this path: `swaps_transaction_blockNumber`.
    pub fn column_name(&self) -> String {
        let mut name = String::from(SWAP_ENTITY);
        for segment in &self.0 {
            name.push('_');
            name.push_str(segment);
        }
        name
    }
}

/// One logical query: all swaps in an inclusive timestamp range, capped at `first` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuery {
    pub fields: Vec<FieldPath>,
    pub timestamp_gte: i64,
    pub timestamp_lte: i64,
    pub first: usize,
}

impl SwapQuery {
    /// Query for every swap stamped within `window` (both bounds inclusive).
    pub fn for_window(window: &TimeWindow, first: usize) -> Self {
        Self {
            fields: DEFAULT_SWAP_FIELDS.iter().map(|f| FieldPath::parse(f)).collect(),
            timestamp_gte: window.start_timestamp(),
            timestamp_lte: window.end_timestamp(),
            first,
        }
    }

    /// Replace the field selection.
    pub fn with_fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields.iter().map(|f| FieldPath::parse(f.as_ref())).collect();
        self
    }

    /// Column headers in selection order.
    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(FieldPath::column_name).collect()
    }

    /// Render one page: `page_size` rows ordered by `id`, strictly after `after_id`.
    ///
    /// `id` is always selected so the caller can advance the cursor.
    pub fn render_page(&self, after_id: Option<&str>, page_size: usize) -> String {
        let mut filter = format!(
            "timestamp_gte: {}, timestamp_lte: {}",
            self.timestamp_gte, self.timestamp_lte
        );
        if let Some(id) = after_id {
            // JSON string escaping is valid GraphQL string syntax.
            let literal = serde_json::to_string(id).unwrap_or_else(|_| format!("\"{id}\""));
            filter.push_str(&format!(", id_gt: {literal}"));
        }

        let mut root = SelectionNode::new(SWAP_ENTITY);
        root.insert(&["id".to_string()]);
        for field in &self.fields {
            root.insert(field.segments());
        }

        format!(
            "query {{ {SWAP_ENTITY}(first: {page_size}, orderBy: id, orderDirection: asc, where: {{ {filter} }}) {} }}",
            root.render_children()
        )
    }
}

/// Selection-set tree; siblings keep insertion order so output is stable.
#[derive(Debug)]
struct SelectionNode {
    name: String,
    children: Vec<SelectionNode>,
}

impl SelectionNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    fn insert(&mut self, path: &[String]) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        let idx = match self.children.iter().position(|c| &c.name == head) {
            Some(i) => i,
            None => {
                self.children.push(SelectionNode::new(head));
                self.children.len() - 1
            }
        };
        self.children[idx].insert(rest);
    }

    fn render_children(&self) -> String {
        let inner: Vec<String> = self.children.iter().map(SelectionNode::render).collect();
        format!("{{ {} }}", inner.join(" "))
    }

    fn render(&self) -> String {
        if self.children.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.render_children())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn jan1() -> TimeWindow {
        TimeWindow::for_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap()
    }

    #[test]
    fn column_names_follow_entity_prefix() {
        assert_eq!(
            FieldPath::parse("transaction.blockNumber").column_name(),
            "swaps_transaction_blockNumber"
        );
        assert_eq!(FieldPath::parse("amountUSD").column_name(), "swaps_amountUSD");
    }

    #[test]
    fn default_selection_has_all_columns() {
        let q = SwapQuery::for_window(&jan1(), DEFAULT_QUERY_SIZE);
        let cols = q.columns();
        assert_eq!(cols.len(), DEFAULT_SWAP_FIELDS.len());
        assert_eq!(cols[0], "swaps_timestamp");
        assert_eq!(cols[1], "swaps_transaction_id");
        assert_eq!(cols.last().unwrap(), "swaps_token1_symbol");
    }

    #[test]
    fn range_is_inclusive_on_both_bounds() {
        let q = SwapQuery::for_window(&jan1(), 10);
        let text = q.render_page(None, 10);
        assert!(text.contains("timestamp_gte: 1704067200"));
        assert!(text.contains("timestamp_lte: 1704153600"));
        assert!(!text.contains("id_gt"));
    }

    #[test]
    fn nested_fields_are_grouped() {
        let q = SwapQuery::for_window(&jan1(), 10).with_fields(&[
            "timestamp",
            "pool.id",
            "transaction.id",
            "pool.liquidity",
        ]);
        let text = q.render_page(None, 5);
        assert!(text.contains("{ id timestamp pool { id liquidity } transaction { id } }"));
        assert!(text.starts_with("query { swaps(first: 5, orderBy: id, orderDirection: asc"));
    }

    #[test]
    fn cursor_is_quoted() {
        let q = SwapQuery::for_window(&jan1(), 10).with_fields(&["timestamp"]);
        let text = q.render_page(Some("0xabc#12"), 100);
        assert!(text.contains(r#"id_gt: "0xabc#12""#));
    }
}
