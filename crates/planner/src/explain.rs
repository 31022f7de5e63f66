use crate::logical_plan::{GroupStrategy, JoinStrategy, LogicalPlan, PlanProperties, SelectItem};

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match &plan.properties {
        PlanProperties::TableScan(scan) => {
            let db = scan.database.as_deref().map(|d| format!("{d}.")).unwrap_or_default();
            out.push_str(&format!("{pad}TableScanPlan table={db}{}", scan.table));
            if let Some(alias) = &scan.alias {
                out.push_str(&format!(" alias={alias}"));
            }
            out.push('\n');
        }
        PlanProperties::Filter(f) => {
            out.push_str(&format!("{pad}FilterPlan {}\n", f.condition));
        }
        PlanProperties::Join(j) => {
            out.push_str(&format!(
                "{pad}JoinPlan type={} strategy={} left={} right={}\n",
                j.join_type,
                fmt_join_strategy(j.strategy),
                j.left,
                j.right
            ));
            out.push_str(&format!("{pad}  on={}\n", j.condition));
        }
        PlanProperties::Group(g) => {
            out.push_str(&format!(
                "{pad}GroupPlan keys=[{}] strategy={}\n",
                g.keys.join(", "),
                fmt_group_strategy(g.strategy)
            ));
            for a in &g.aggregates {
                out.push_str(&format!("{pad}  agg {a}\n"));
            }
        }
        PlanProperties::Order(o) => {
            let keys = o
                .keys
                .iter()
                .map(|k| format!("{} {}", k.column, k.direction))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{pad}OrderPlan [{keys}]\n"));
        }
        PlanProperties::Limit(l) => {
            let limit = l.limit.map(|n| n.to_string()).unwrap_or_else(|| "ALL".to_string());
            out.push_str(&format!("{pad}LimitPlan limit={limit} offset={}\n", l.offset));
        }
        PlanProperties::Select(s) => {
            out.push_str(&format!("{pad}SelectPlan\n"));
            for item in &s.items {
                match item {
                    SelectItem::Wildcard => out.push_str(&format!("{pad}  *\n")),
                    SelectItem::Expr { expr, .. } => {
                        let header = item.header().unwrap_or_default();
                        out.push_str(&format!("{pad}  {header} := {expr}\n"));
                    }
                }
            }
        }
        PlanProperties::Insert(i) => {
            out.push_str(&format!(
                "{pad}InsertPlan table={} columns={:?} rows={}\n",
                i.table,
                i.columns,
                i.values.len()
            ));
        }
        PlanProperties::Update(u) => {
            out.push_str(&format!("{pad}UpdatePlan table={}", u.table));
            if let Some(alias) = &u.alias {
                out.push_str(&format!(" alias={alias}"));
            }
            out.push('\n');
            for a in &u.assignments {
                out.push_str(&format!("{pad}  {} := {}\n", a.column, a.value));
            }
            if let Some(c) = &u.condition {
                out.push_str(&format!("{pad}  where {c}\n"));
            }
        }
        PlanProperties::Delete(d) => {
            out.push_str(&format!("{pad}DeletePlan table={}", d.table));
            if let Some(alias) = &d.alias {
                out.push_str(&format!(" alias={alias}"));
            }
            out.push('\n');
            if let Some(c) = &d.condition {
                out.push_str(&format!("{pad}  where {c}\n"));
            }
        }
    }
    for child in &plan.children {
        fmt_plan(child, indent + 1, out);
    }
}

fn fmt_join_strategy(s: JoinStrategy) -> &'static str {
    match s {
        JoinStrategy::Hash => "hash",
        JoinStrategy::NestedLoop => "nested_loop",
    }
}

fn fmt_group_strategy(s: GroupStrategy) -> &'static str {
    match s {
        GroupStrategy::Hash => "hash",
        GroupStrategy::Sort => "sort",
    }
}
