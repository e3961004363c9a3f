use crate::generic::object::{AttesterId, Epoch};
use crate::Fr;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("table {table} has no column {column}")]
    UnknownColumn { table: Table, column: String },
    #[error("ledger backend failure: {0}")]
    Backend(String),
}

/// The record families a synchronizer replays from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Attestation,
    Nullifier,
    UserSignUp,
    StateTreeLeaf,
    HistoryTreeLeaf,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Table::Attestation => "Attestation",
            Table::Nullifier => "Nullifier",
            Table::UserSignUp => "UserSignUp",
            Table::StateTreeLeaf => "StateTreeLeaf",
            Table::HistoryTreeLeaf => "HistoryTreeLeaf",
        })
    }
}

/// A column value. Columns hold either small integers (epochs, indices) or field elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Int(u64),
    Field(Fr),
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as u64)
    }
}

impl From<Fr> for Value {
    fn from(v: Fr) -> Self {
        Value::Field(v)
    }
}

impl From<AttesterId> for Value {
    fn from(v: AttesterId) -> Self {
        Value::Field(v.0)
    }
}

/// A reputation delta posted against an epoch key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub epoch: Epoch,
    pub epoch_key: Fr,
    pub attester_id: AttesterId,
    pub field_index: usize,
    pub change: Fr,
    /// Global insertion order.
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nullifier {
    /// The epoch the user transitioned into.
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub nullifier: Fr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSignUp {
    pub commitment: Fr,
    pub attester_id: AttesterId,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTreeLeaf {
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub hash: Fr,
    /// Position in the attester's state tree for `epoch`.
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTreeLeaf {
    pub attester_id: AttesterId,
    pub leaf: Fr,
    pub index: u64,
}

/// Type erased record, as stored by a ledger backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyRecord {
    Attestation(Attestation),
    Nullifier(Nullifier),
    UserSignUp(UserSignUp),
    StateTreeLeaf(StateTreeLeaf),
    HistoryTreeLeaf(HistoryTreeLeaf),
}

impl AnyRecord {
    pub fn table(&self) -> Table {
        match self {
            AnyRecord::Attestation(_) => Table::Attestation,
            AnyRecord::Nullifier(_) => Table::Nullifier,
            AnyRecord::UserSignUp(_) => Table::UserSignUp,
            AnyRecord::StateTreeLeaf(_) => Table::StateTreeLeaf,
            AnyRecord::HistoryTreeLeaf(_) => Table::HistoryTreeLeaf,
        }
    }
}

/// A typed row of one ledger table.
pub trait Record: Clone + Send + Sync + 'static {
    const TABLE: Table;

    /// Column lookup by name. `None` if the table has no such column.
    fn column(&self, name: &str) -> Option<Value>;

    fn into_any(self) -> AnyRecord;

    fn from_any(any: &AnyRecord) -> Option<&Self>;
}

macro_rules! record {
    ($ty:ident, { $($col:literal => $field:ident),* $(,)? }) => {
        impl Record for $ty {
            const TABLE: Table = Table::$ty;

            fn column(&self, name: &str) -> Option<Value> {
                match name {
                    $($col => Some(Value::from(self.$field)),)*
                    _ => None,
                }
            }

            fn into_any(self) -> AnyRecord {
                AnyRecord::$ty(self)
            }

            fn from_any(any: &AnyRecord) -> Option<&Self> {
                match any {
                    AnyRecord::$ty(r) => Some(r),
                    _ => None,
                }
            }
        }
    };
}

record!(Attestation, {
    "epoch" => epoch,
    "epochKey" => epoch_key,
    "attesterId" => attester_id,
    "fieldIndex" => field_index,
    "change" => change,
    "index" => index,
});
record!(Nullifier, { "epoch" => epoch, "attesterId" => attester_id, "nullifier" => nullifier });
record!(UserSignUp, { "commitment" => commitment, "attesterId" => attester_id, "epoch" => epoch });
record!(StateTreeLeaf, {
    "epoch" => epoch,
    "attesterId" => attester_id,
    "hash" => hash,
    "index" => index,
});
record!(HistoryTreeLeaf, { "attesterId" => attester_id, "leaf" => leaf, "index" => index });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
    Gt(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    Lte(&'static str, Value),
    /// Matches if any of the conjunctions matches.
    Or(Vec<Vec<Filter>>),
}

impl Filter {
    pub fn matches<R: Record>(&self, record: &R) -> Result<bool, LedgerError> {
        let col = |name: &str| {
            record.column(name).ok_or_else(|| LedgerError::UnknownColumn {
                table: R::TABLE,
                column: name.to_string(),
            })
        };
        Ok(match self {
            Filter::Eq(c, v) => col(*c)? == *v,
            Filter::In(c, vs) => vs.contains(&col(*c)?),
            Filter::Gt(c, v) => col(*c)? > *v,
            Filter::Gte(c, v) => col(*c)? >= *v,
            Filter::Lt(c, v) => col(*c)? < *v,
            Filter::Lte(c, v) => col(*c)? <= *v,
            Filter::Or(clauses) => {
                for clause in clauses {
                    if all_match(clause, record)? {
                        return Ok(true);
                    }
                }
                false
            }
        })
    }
}

fn all_match<R: Record>(filters: &[Filter], record: &R) -> Result<bool, LedgerError> {
    for filter in filters {
        if !filter.matches(record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A conjunction of filters with an optional ordering.
///
/// ```
/// # use unirep_state::generic::ledger::{Query, Order};
/// let q = Query::new()
///     .eq("epoch", 3u64)
///     .or([Query::new().eq("epochKey", 7u64), Query::new().eq("epochKey", 8u64)])
///     .order_by("index", Order::Asc);
/// assert_eq!(q.filters.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(&'static str, Order)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push(Filter::In(
            column,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn gt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(column, value.into()));
        self
    }

    pub fn gte(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column, value.into()));
        self
    }

    pub fn lt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(column, value.into()));
        self
    }

    pub fn lte(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column, value.into()));
        self
    }

    /// Adds a disjunction. The filters of each clause are and-ed; their orderings are ignored.
    pub fn or(mut self, clauses: impl IntoIterator<Item = Query>) -> Self {
        self.filters
            .push(Filter::Or(clauses.into_iter().map(|q| q.filters).collect()));
        self
    }

    pub fn order_by(mut self, column: &'static str, order: Order) -> Self {
        self.order_by = Some((column, order));
        self
    }

    pub fn matches<R: Record>(&self, record: &R) -> Result<bool, LedgerError> {
        all_match(&self.filters, record)
    }

    /// Filters and orders `records`. The sort is stable, so ties keep insertion order.
    pub fn apply<'a, R: Record>(
        &self,
        records: impl IntoIterator<Item = &'a R>,
    ) -> Result<Vec<R>, LedgerError> {
        let mut out = Vec::new();
        for record in records {
            if self.matches(record)? {
                out.push(record.clone());
            }
        }

        if let Some((column, order)) = self.order_by {
            let mut keyed = out
                .into_iter()
                .map(|r| {
                    let key = r.column(column).ok_or_else(|| LedgerError::UnknownColumn {
                        table: R::TABLE,
                        column: column.to_string(),
                    })?;
                    Ok((key, r))
                })
                .collect::<Result<Vec<_>, LedgerError>>()?;
            keyed.sort_by(|(a, _), (b, _)| match order {
                Order::Asc => a.cmp(b),
                Order::Desc => b.cmp(a),
            });
            out = keyed.into_iter().map(|(_, r)| r).collect();
        }
        Ok(out)
    }
}

/// Read access to the replayed ledger.
///
/// The engine never writes through this trait. Writes belong to whatever keeps the ledger in
/// sync with the chain, which is expected to serialize them.
pub trait Ledger: Send + Sync {
    async fn find_one<R: Record>(&self, query: &Query) -> Result<Option<R>, LedgerError>;

    async fn find_many<R: Record>(&self, query: &Query) -> Result<Vec<R>, LedgerError>;

    async fn count<R: Record>(&self, query: &Query) -> Result<usize, LedgerError> {
        Ok(self.find_many::<R>(query).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(index: u64, epoch: Epoch, field_index: usize) -> Attestation {
        Attestation {
            epoch,
            epoch_key: Fr::from(index * 10),
            attester_id: AttesterId::from(1u64),
            field_index,
            change: Fr::from(1u64),
            index,
        }
    }

    #[test]
    fn filters_and_orders() {
        let rows = vec![att(3, 1, 0), att(1, 1, 1), att(2, 2, 0), att(0, 1, 0)];
        let q = Query::new().eq("epoch", 1u64).order_by("index", Order::Asc);
        let got = q.apply(&rows).unwrap();
        assert_eq!(got.iter().map(|a| a.index).collect::<Vec<_>>(), vec![0, 1, 3]);

        let q = Query::new().gte("index", 1u64).order_by("index", Order::Desc);
        let got = q.apply(&rows).unwrap();
        assert_eq!(got.iter().map(|a| a.index).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn or_of_conjunctions() {
        let rows = vec![att(0, 1, 0), att(1, 2, 1), att(2, 3, 0)];
        let q = Query::new()
            .or([
                Query::new().eq("epoch", 1u64),
                Query::new().eq("epoch", 2u64).eq("fieldIndex", 0usize),
                Query::new().eq("epoch", 3u64),
            ])
            .order_by("index", Order::Asc);
        let got = q.apply(&rows).unwrap();
        assert_eq!(got.iter().map(|a| a.index).collect::<Vec<_>>(), vec![0, 2]);

        let q = Query::new().one_of("epochKey", [Fr::from(10u64), Fr::from(20u64)]);
        assert_eq!(q.apply(&rows).unwrap().len(), 2);
    }

    #[test]
    fn unknown_columns_are_errors() {
        let rows = vec![att(0, 1, 0)];
        let err = Query::new().eq("nope", 1u64).apply(&rows).unwrap_err();
        assert_eq!(
            err,
            LedgerError::UnknownColumn {
                table: Table::Attestation,
                column: "nope".into()
            }
        );
        assert!(Query::new().order_by("nope", Order::Asc).apply(&rows).is_err());
    }
}
