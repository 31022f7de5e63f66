use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_common::{Result, TesseraError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference, optionally qualified (`u.id`).
    Column(String),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// Aggregate call. `arg: None` is `COUNT(*)`.
    Aggregate {
        func: AggregateFunction,
        arg: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        };
        f.write_str(s)
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int64(v) => write!(f, "{v}"),
            LiteralValue::Float64(v) => write!(f, "{v:?}"),
            LiteralValue::Utf8(v) => write!(f, "'{}'", v.replace('\'', "''")),
            LiteralValue::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            LiteralValue::Null => f.write_str("NULL"),
        }
    }
}

/// SQL-like rendering. Aggregate output columns are named by this text.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => f.write_str(c),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::And(a, b) => write!(f, "({a} AND {b})"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
            Expr::Not(x) => write!(f, "NOT ({x})"),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::Aggregate { func, arg } => match arg {
                Some(a) => write!(f, "{func}({a})"),
                None => write!(f, "{func}(*)"),
            },
        }
    }
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit_i64(v: i64) -> Self {
        Expr::Literal(LiteralValue::Int64(v))
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Header text for a projected expression: the bare column name for
    /// column references, otherwise the rendered expression.
    pub fn display_name(&self) -> String {
        match self {
            Expr::Column(c) => c.rsplit('.').next().unwrap_or(c).to_string(),
            other => other.to_string(),
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Column(_) | Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::And(a, b) | Expr::Or(a, b) => a.contains_aggregate() || b.contains_aggregate(),
            Expr::Not(x) => x.contains_aggregate(),
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
        }
    }

    /// Appends every aggregate call in `self` to `out`, skipping duplicates.
    pub fn collect_aggregates(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Aggregate { .. } => {
                if !out.contains(self) {
                    out.push(self.clone());
                }
            }
            Expr::Column(_) | Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_aggregates(out);
                right.collect_aggregates(out);
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_aggregates(out);
                b.collect_aggregates(out);
            }
            Expr::Not(x) => x.collect_aggregates(out),
            Expr::IsNull { expr, .. } => expr.collect_aggregates(out),
        }
    }
}

/// Closed vocabulary of plan node tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanType {
    SelectPlan,
    TableScanPlan,
    FilterPlan,
    JoinPlan,
    OrderPlan,
    GroupPlan,
    LimitPlan,
    InsertPlan,
    UpdatePlan,
    DeletePlan,
}

impl PlanType {
    pub const ALL: [PlanType; 10] = [
        PlanType::SelectPlan,
        PlanType::TableScanPlan,
        PlanType::FilterPlan,
        PlanType::JoinPlan,
        PlanType::OrderPlan,
        PlanType::GroupPlan,
        PlanType::LimitPlan,
        PlanType::InsertPlan,
        PlanType::UpdatePlan,
        PlanType::DeletePlan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlanType::SelectPlan => "SelectPlan",
            PlanType::TableScanPlan => "TableScanPlan",
            PlanType::FilterPlan => "FilterPlan",
            PlanType::JoinPlan => "JoinPlan",
            PlanType::OrderPlan => "OrderPlan",
            PlanType::GroupPlan => "GroupPlan",
            PlanType::LimitPlan => "LimitPlan",
            PlanType::InsertPlan => "InsertPlan",
            PlanType::UpdatePlan => "UpdatePlan",
            PlanType::DeletePlan => "DeletePlan",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Number of children a well-formed node of this type has.
    pub fn arity(self) -> usize {
        match self {
            PlanType::TableScanPlan
            | PlanType::InsertPlan
            | PlanType::UpdatePlan
            | PlanType::DeletePlan => 0,
            PlanType::JoinPlan => 2,
            PlanType::SelectPlan
            | PlanType::FilterPlan
            | PlanType::OrderPlan
            | PlanType::GroupPlan
            | PlanType::LimitPlan => 1,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => f.write_str("INNER"),
        }
    }
}

/// Physical join algorithm chosen by the optimizer. Both produce identical rows
/// in identical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinStrategy {
    #[default]
    Hash,
    NestedLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupStrategy {
    #[default]
    Hash,
    Sort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableScanProperties {
    pub table: String,
    /// Explicit `db.table` qualifier; `None` resolves through the session.
    pub database: Option<String>,
    pub alias: Option<String>,
}

impl TableScanProperties {
    /// Name that qualifies this scan's columns.
    pub fn relation(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterProperties {
    pub condition: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinProperties {
    pub join_type: JoinType,
    /// Table read by the first child.
    pub left: String,
    /// Table read by the second child.
    pub right: String,
    pub left_key: Expr,
    pub right_key: Expr,
    /// Full ON condition. Conjuncts beyond the key equality are applied to
    /// matched pairs.
    pub condition: Expr,
    pub strategy: JoinStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProperties {
    pub keys: Vec<OrderKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProperties {
    pub keys: Vec<String>,
    /// `Expr::Aggregate` values, output after the key columns in this order.
    pub aggregates: Vec<Expr>,
    pub strategy: GroupStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitProperties {
    pub limit: Option<u64>,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

impl SelectItem {
    pub fn header(&self) -> Option<String> {
        match self {
            SelectItem::Wildcard => None,
            SelectItem::Expr { expr, alias } => {
                Some(alias.clone().unwrap_or_else(|| expr.display_name()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectProperties {
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertProperties {
    pub table: String,
    pub database: Option<String>,
    /// Empty means every table column in order.
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProperties {
    pub table: String,
    pub database: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    pub condition: Option<Expr>,
}

impl UpdateProperties {
    /// Name that qualifies the target table's columns.
    pub fn relation(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteProperties {
    pub table: String,
    pub database: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    pub condition: Option<Expr>,
}

impl DeleteProperties {
    pub fn relation(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Per-type payload. One variant per [`PlanType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanProperties {
    Select(SelectProperties),
    TableScan(TableScanProperties),
    Filter(FilterProperties),
    Join(JoinProperties),
    Order(OrderProperties),
    Group(GroupProperties),
    Limit(LimitProperties),
    Insert(InsertProperties),
    Update(UpdateProperties),
    Delete(DeleteProperties),
}

impl PlanProperties {
    pub fn plan_type(&self) -> PlanType {
        match self {
            PlanProperties::Select(_) => PlanType::SelectPlan,
            PlanProperties::TableScan(_) => PlanType::TableScanPlan,
            PlanProperties::Filter(_) => PlanType::FilterPlan,
            PlanProperties::Join(_) => PlanType::JoinPlan,
            PlanProperties::Order(_) => PlanType::OrderPlan,
            PlanProperties::Group(_) => PlanType::GroupPlan,
            PlanProperties::Limit(_) => PlanType::LimitPlan,
            PlanProperties::Insert(_) => PlanType::InsertPlan,
            PlanProperties::Update(_) => PlanType::UpdatePlan,
            PlanProperties::Delete(_) => PlanType::DeletePlan,
        }
    }
}

/// Logical plan node: a type tag, its payload, and ordered children.
///
/// The first child is the primary input. Nodes are built once by the
/// optimizer and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalPlan {
    pub plan_type: PlanType,
    pub properties: PlanProperties,
    pub children: Vec<LogicalPlan>,
}

impl LogicalPlan {
    pub fn new(properties: PlanProperties, children: Vec<LogicalPlan>) -> Self {
        Self {
            plan_type: properties.plan_type(),
            properties,
            children,
        }
    }

    pub fn leaf(properties: PlanProperties) -> Self {
        Self::new(properties, Vec::new())
    }

    /// Wraps `self` as the single child of a new node.
    pub fn wrap(self, properties: PlanProperties) -> Self {
        Self::new(properties, vec![self])
    }

    pub fn input(&self) -> Option<&LogicalPlan> {
        self.children.first()
    }

    /// Checks tag/payload agreement and child count for this node only.
    pub fn check_node(&self) -> Result<()> {
        let payload = self.properties.plan_type();
        if payload != self.plan_type {
            return Err(TesseraError::UnsupportedPlanType(format!(
                "{} node carries {} properties",
                self.plan_type, payload
            )));
        }
        let want = self.plan_type.arity();
        if self.children.len() != want {
            return Err(TesseraError::Execution(format!(
                "{} expects {want} children, found {}",
                self.plan_type,
                self.children.len()
            )));
        }
        Ok(())
    }

    /// Pre-order walk.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a LogicalPlan)) {
        f(self);
        for c in &self.children {
            c.visit(f);
        }
    }

    /// First node of `plan_type` in pre-order.
    pub fn find(&self, plan_type: PlanType) -> Option<&LogicalPlan> {
        let mut found = None;
        self.visit(&mut |p| {
            if found.is_none() && p.plan_type == plan_type {
                found = Some(p);
            }
        });
        found
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TesseraError::Planning(e.to_string()))
    }

    /// Decodes a serialized plan. Unknown type tags fail with
    /// `UnsupportedPlanType`.
    pub fn from_json(s: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| TesseraError::Planning(e.to_string()))?;
        check_plan_tags(&value)?;
        serde_json::from_value(value).map_err(|e| TesseraError::Planning(e.to_string()))
    }
}

fn check_plan_tags(node: &serde_json::Value) -> Result<()> {
    if let Some(tag) = node.get("plan_type").and_then(|t| t.as_str()) {
        if PlanType::from_name(tag).is_none() {
            return Err(TesseraError::UnsupportedPlanType(tag.to_string()));
        }
    }
    if let Some(props) = node.get("properties").and_then(|p| p.as_object()) {
        for key in props.keys() {
            if PlanType::from_name(&format!("{key}Plan")).is_none() {
                return Err(TesseraError::UnsupportedPlanType(key.clone()));
            }
        }
    }
    if let Some(children) = node.get("children").and_then(|c| c.as_array()) {
        for child in children {
            check_plan_tags(child)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(table: &str) -> LogicalPlan {
        LogicalPlan::leaf(PlanProperties::TableScan(TableScanProperties {
            table: table.to_string(),
            database: None,
            alias: None,
        }))
    }

    #[test]
    fn constructor_derives_tag_from_payload() {
        let plan = scan("users").wrap(PlanProperties::Filter(FilterProperties {
            condition: Expr::binary(Expr::column("age"), BinaryOp::Gt, Expr::lit_i64(18)),
        }));
        assert_eq!(plan.plan_type, PlanType::FilterPlan);
        assert_eq!(plan.children[0].plan_type, PlanType::TableScanPlan);
        plan.check_node().expect("well formed");
    }

    #[test]
    fn mismatched_tag_is_unsupported() {
        let mut plan = scan("users");
        plan.plan_type = PlanType::DeletePlan;
        assert!(matches!(
            plan.check_node(),
            Err(TesseraError::UnsupportedPlanType(_))
        ));
    }

    #[test]
    fn json_round_trip_preserves_plan() {
        let plan = scan("users").wrap(PlanProperties::Select(SelectProperties {
            items: vec![SelectItem::Expr {
                expr: Expr::Aggregate {
                    func: AggregateFunction::Count,
                    arg: None,
                },
                alias: Some("n".to_string()),
            }],
        }));
        let json = plan.to_json().expect("encode");
        assert_eq!(LogicalPlan::from_json(&json).expect("decode"), plan);
    }

    #[test]
    fn unknown_tag_in_json_is_unsupported() {
        let json = scan("users")
            .to_json()
            .expect("encode")
            .replace("\"TableScanPlan\"", "\"WindowPlan\"");
        let err = LogicalPlan::from_json(&json).expect_err("unknown tag");
        assert!(matches!(err, TesseraError::UnsupportedPlanType(ref t) if t == "WindowPlan"));
    }

    #[test]
    fn display_names_follow_sql_text() {
        let count = Expr::Aggregate {
            func: AggregateFunction::Count,
            arg: None,
        };
        let sum = Expr::Aggregate {
            func: AggregateFunction::Sum,
            arg: Some(Box::new(Expr::column("salary"))),
        };
        assert_eq!(count.display_name(), "COUNT(*)");
        assert_eq!(sum.display_name(), "SUM(salary)");
        assert_eq!(Expr::column("u.id").display_name(), "id");
        assert_eq!(
            Expr::binary(Expr::column("age"), BinaryOp::Plus, Expr::lit_i64(1)).display_name(),
            "age + 1"
        );
    }
}
