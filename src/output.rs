use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::cleanup::{CleanupReport, Outcome};
use crate::resource::ResourceNode;

pub fn node_label(node: &ResourceNode) -> String {
    format!("{} {} [{}] {}", node.kind, node.name, node.state(), node.id)
}

/// Renders a node and everything below it, children grouped by kind.
pub fn render_tree(node: &ResourceNode) -> Tree<String> {
    Tree::new(node_label(node)).with_leaves(node.iter_children().map(render_tree))
}

#[derive(Tabled)]
struct SummaryRow {
    region: String,
    discovered: usize,
    terminated: usize,
    #[tabled(rename = "already gone")]
    already_terminal: usize,
    compensated: usize,
    simulated: usize,
    retained: usize,
    preserved: usize,
    failed: usize,
}

impl From<&CleanupReport> for SummaryRow {
    fn from(report: &CleanupReport) -> Self {
        Self {
            region: report.region.clone(),
            discovered: report.discovered,
            terminated: report.count(Outcome::Terminated),
            already_terminal: report.count(Outcome::AlreadyTerminal),
            compensated: report.count(Outcome::Compensated),
            simulated: report.count(Outcome::Simulated),
            retained: report.count(Outcome::Retained),
            preserved: report.count(Outcome::Preserved),
            failed: report.count(Outcome::Failed),
        }
    }
}

pub fn summary_table(reports: &[CleanupReport]) -> String {
    let rows: Vec<SummaryRow> = reports.iter().map(SummaryRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceDescriptor, ResourceKind};

    #[test]
    fn test_tree_rendering() {
        let mut root = ResourceNode::tenancy("root", "acme");
        let mut dev = ResourceNode::from_descriptor(
            ResourceKind::Compartment,
            ResourceDescriptor::new("dev", "Dev", "root"),
        );
        dev.append(ResourceNode::from_descriptor(
            ResourceKind::Vcn,
            ResourceDescriptor::new("vcn1", "net", "dev").with_state("AVAILABLE"),
        ));
        root.append(dev);

        let rendered = render_tree(&root).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "compartment acme [ACTIVE] root");
        assert!(lines[1].ends_with("compartment Dev [ACTIVE] dev"));
        assert!(lines[2].ends_with("vcn net [ACTIVE] vcn1"));
    }

    #[test]
    fn test_summary_table_counts() {
        let mut report = CleanupReport::new("eu-frankfurt-1");
        report.discovered = 3;
        report.record(ResourceKind::Instance, "i1", Outcome::Terminated);
        report.record(ResourceKind::SecurityList, "sl1", Outcome::Compensated);
        report.record(ResourceKind::Cpe, "cpe1", Outcome::Failed);

        let table = summary_table(&[report]);
        assert!(table.contains("eu-frankfurt-1"));
        assert!(table.contains("already gone"));
        assert!(table.contains("compensated"));
    }
}
