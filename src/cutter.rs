use crate::dom;
use crate::error::PageBindError;
use crate::template;
use crate::units::{MarginBox, Orientation, PaperFormat, PaperSpec, PX_PER_CM};
use kuchiki::NodeRef;
use log::{debug, trace};
use std::collections::HashSet;

const EPS: f64 = 0.01;

pub const PAGE_HEADER_TAG: &str = "page-header";
pub const PAGE_FOOTER_TAG: &str = "page-footer";

/// Box metrics for one node, in device pixels, relative to the flow origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxMetrics {
    pub top: f64,
    pub bottom: f64,
}

/// Layout measurement collaborator. Metrics must reflect the current tree;
/// the cutter only measures during cut discovery and only mutates afterward,
/// so one pass never interleaves the two.
pub trait Layout {
    fn measure(&self, node: &NodeRef) -> BoxMetrics;

    /// Top margin of a node, used for carried-overhead accounting when the
    /// node re-opens on a fresh page. Collaborators without margin data can
    /// rely on the default.
    fn margin_top(&self, _node: &NodeRef) -> f64 {
        0.0
    }
}

pub struct CutterConfig {
    pub paper: PaperFormat,
    pub margin: MarginBox,
    pub orientation: Orientation,
    /// Tags eligible as cut candidates.
    pub cutable_tags: HashSet<String>,
    /// Tags accepted as a cut candidate without descending into children.
    pub force_closest_tags: HashSet<String>,
    /// Tags that force a top-level cut even with space remaining.
    pub force_cut_tags: HashSet<String>,
    /// How far above the ideal boundary a preferred break may move.
    pub max_overcut: f64,
    /// Tags whose top margin survives when they open a new page. Everything
    /// else has its top margin suppressed at a page start.
    pub keep_margin_top_tags: HashSet<String>,
}

fn tag_set(tags: &[&str]) -> HashSet<String> {
    tags.iter().map(|tag| tag.to_string()).collect()
}

impl Default for CutterConfig {
    fn default() -> Self {
        Self {
            paper: PaperFormat::A4,
            margin: MarginBox::uniform(2.0 * PX_PER_CM),
            orientation: Orientation::Portrait,
            cutable_tags: tag_set(&[
                "ul",
                "ol",
                "li",
                "p",
                "pre",
                "div",
                "table",
                "tbody",
                "tr",
                "section",
                "blockquote",
                "img",
                "h1",
                "h2",
                "h3",
                "h4",
                "h5",
                "h6",
                "hr",
            ]),
            force_closest_tags: tag_set(&["pre"]),
            force_cut_tags: tag_set(&["h1", "h2", "hr"]),
            max_overcut: 8.0 * PX_PER_CM,
            keep_margin_top_tags: tag_set(&["h1"]),
        }
    }
}

/// Measurement snapshot of one cut candidate. Never outlives the pass.
#[derive(Clone)]
struct CutSnapshot {
    node: NodeRef,
    top: f64,
    bottom: f64,
}

/// Ordered candidates from the container root down to the innermost cut.
type CutPath = Vec<CutSnapshot>;

/// One output page: a content subtree plus its instantiated chrome.
pub struct PageDescriptor {
    pub number: u32,
    pub paper: PaperSpec,
    pub content: NodeRef,
    pub header: Option<NodeRef>,
    pub footer: Option<NodeRef>,
    /// Index of the owning container; the per-container page count lives in
    /// `Pagination::containers` and is stable once `paginate` returns.
    pub container: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ContainerPages {
    pub paper: PaperSpec,
    pub first_page: u32,
    pub page_count: u32,
}

pub struct Pagination {
    pub pages: Vec<PageDescriptor>,
    pub containers: Vec<ContainerPages>,
}

impl Pagination {
    pub fn page_count(&self, container: usize) -> u32 {
        self.containers[container].page_count
    }
}

/// A maximal sibling run sharing one paper configuration.
struct ContainerRun {
    paper: PaperSpec,
    header: Option<NodeRef>,
    footer: Option<NodeRef>,
    page_number: Option<u32>,
    nodes: Vec<NodeRef>,
}

impl ContainerRun {
    fn new(paper: PaperSpec) -> Self {
        Self {
            paper,
            header: None,
            footer: None,
            page_number: None,
            nodes: Vec::new(),
        }
    }
}

/// Cuts the children of `root` into pages.
///
/// Walks the tree once per container: cut discovery measures against the
/// intact tree, then pages are materialized in reverse discovery order so
/// finalized pages are never re-measured.
pub fn paginate(
    root: &NodeRef,
    layout: &dyn Layout,
    config: &CutterConfig,
) -> Result<Pagination, PageBindError> {
    let runs = segment_containers(root, config)?;
    let mut pages = Vec::new();
    let mut containers = Vec::new();
    let mut next_number: u32 = 1;

    for run in runs {
        if run.nodes.is_empty() {
            continue;
        }
        let first_page = run.page_number.unwrap_or(next_number);
        let container_index = containers.len();
        let contents = cut_container(&run, layout, config)?;
        let page_count = contents.len() as u32;
        debug!(
            "container {} cut into {} page(s) starting at {}",
            container_index, page_count, first_page
        );
        for (offset, content) in contents.into_iter().enumerate() {
            let number = first_page + offset as u32;
            pages.push(PageDescriptor {
                number,
                paper: run.paper,
                content,
                header: run
                    .header
                    .as_ref()
                    .map(|tpl| template::render(tpl, number, page_count)),
                footer: run
                    .footer
                    .as_ref()
                    .map(|tpl| template::render(tpl, number, page_count)),
                container: container_index,
            });
        }
        containers.push(ContainerPages {
            paper: run.paper,
            first_page,
            page_count,
        });
        next_number = first_page + page_count;
    }

    Ok(Pagination { pages, containers })
}

fn segment_containers(
    root: &NodeRef,
    config: &CutterConfig,
) -> Result<Vec<ContainerRun>, PageBindError> {
    let default_paper = PaperSpec {
        format: config.paper,
        margin: config.margin,
        orientation: config.orientation,
    };
    let mut runs: Vec<ContainerRun> = Vec::new();
    let mut current = ContainerRun::new(default_paper);

    for child in root.children() {
        match dom::tag_name(&child).as_deref() {
            Some(PAGE_HEADER_TAG) => {
                if current.header.is_some() || !current.nodes.is_empty() {
                    runs.push(current);
                    current = ContainerRun::new(default_paper);
                }
                current.paper = paper_spec_for(&child, default_paper)?;
                current.page_number = dom::attribute(&child, "page-number")
                    .and_then(|value| value.trim().parse().ok());
                current.header = Some(child.clone());
            }
            Some(PAGE_FOOTER_TAG) => {
                current.footer = Some(child.clone());
            }
            _ => {
                // Leading whitespace before the first container is dropped.
                if dom::is_whitespace_text(&child)
                    && current.nodes.is_empty()
                    && current.header.is_none()
                    && runs.is_empty()
                {
                    continue;
                }
                current.nodes.push(child.clone());
            }
        }
    }
    runs.push(current);
    Ok(runs)
}

fn paper_spec_for(header: &NodeRef, base: PaperSpec) -> Result<PaperSpec, PageBindError> {
    let mut spec = base;
    if let Some(token) = dom::attribute(header, "paper") {
        spec.format = PaperFormat::parse(&token)?;
    }
    if let Some(token) = dom::attribute(header, "margin") {
        spec.margin = MarginBox::parse(&token)?;
    }
    if let Some(token) = dom::attribute(header, "orientation") {
        spec.orientation = Orientation::parse(&token)?;
    }
    Ok(spec)
}

/// Discovers all cuts for one container, then materializes its pages.
fn cut_container(
    run: &ContainerRun,
    layout: &dyn Layout,
    config: &CutterConfig,
) -> Result<Vec<NodeRef>, PageBindError> {
    let content_height = run.paper.content_height();
    if content_height <= 0.0 {
        return Err(PageBindError::InvalidMargin(
            "margins consume the whole page".to_string(),
        ));
    }

    let first_top = run
        .nodes
        .iter()
        .find(|node| node.as_element().is_some())
        .map(|node| layout.measure(node).top);
    let Some(first_top) = first_top else {
        // Text-only container: nothing measurable, a single page holds it.
        return Ok(vec![wrap_page(run.nodes.clone())]);
    };

    let cutter = Cutter {
        layout,
        run,
        config,
    };
    let mut cuts: Vec<CutPath> = Vec::new();
    let mut page_top = first_top;
    let mut boundary = first_top + content_height;

    while let Some(path) = cutter.find_cut(boundary, page_top) {
        let path = cutter.refine_cut(path, page_top);
        let innermost = path.last().map(|s| (s.top, s.bottom));
        let Some((cut_top, _)) = innermost else { break };
        let overhead = cutter.carried_overhead(&path);
        let next_boundary = cut_top + content_height - overhead;
        trace!(
            "cut at {} (top {:.1}px, overhead {:.1}px, boundary {:.1}px -> {:.1}px)",
            describe_path(&path),
            cut_top,
            overhead,
            boundary,
            next_boundary
        );
        if next_boundary <= boundary + EPS {
            return Err(PageBindError::PaginationLoopDetected(describe_path(&path)));
        }
        cuts.push(path);
        page_top = cut_top;
        boundary = next_boundary;
    }

    Ok(materialize(run, &cuts))
}

struct Cutter<'a> {
    layout: &'a dyn Layout,
    run: &'a ContainerRun,
    config: &'a CutterConfig,
}

impl Cutter<'_> {
    fn is_cutable(&self, tag: &str) -> bool {
        self.config.cutable_tags.contains(tag)
    }

    /// Finds the next cut path, or `None` once the container fits.
    fn find_cut(&self, boundary: f64, page_top: f64) -> Option<CutPath> {
        let mut path = CutPath::new();
        if self.scan(self.run.nodes.iter().cloned(), true, boundary, page_top, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn scan(
        &self,
        level: impl Iterator<Item = NodeRef>,
        top_level: bool,
        boundary: f64,
        page_top: f64,
        path: &mut CutPath,
    ) -> bool {
        for node in level {
            let Some(tag) = dom::tag_name(&node) else {
                continue;
            };
            if !self.is_cutable(&tag) {
                continue;
            }
            let metrics = self.layout.measure(&node);
            let forced = top_level
                && self.config.force_cut_tags.contains(&tag)
                && metrics.top > page_top + EPS;
            if metrics.bottom <= boundary + EPS && !forced {
                continue;
            }
            path.push(CutSnapshot {
                node: node.clone(),
                top: metrics.top,
                bottom: metrics.bottom,
            });
            // A node starting at the page top cannot be a cut itself (the
            // boundary would not advance); only a descendant can. Overflow
            // past the boundary is tolerated when no such descendant exists.
            if metrics.top <= page_top + EPS {
                if self.scan(node.children(), false, boundary, page_top, path) {
                    return true;
                }
                path.pop();
                continue;
            }
            // Accept as the closest cut when descending cannot help: a forced
            // break, a node wholly past the boundary, a force-closest tag
            // partially fitting, or a node with nothing cutable inside.
            let force_closest = self.config.force_closest_tags.contains(&tag);
            let wholly_past = metrics.top >= boundary - EPS;
            if forced || wholly_past || force_closest || !self.has_cutable_child(&node) {
                return true;
            }
            if self.scan(node.children(), false, boundary, page_top, path) {
                return true;
            }
            // Children all fit within the boundary; keep this node whole and
            // continue from the next sibling.
            path.pop();
        }
        false
    }

    fn has_cutable_child(&self, node: &NodeRef) -> bool {
        node.children()
            .filter_map(|child| dom::tag_name(&child))
            .any(|tag| self.is_cutable(&tag))
    }

    /// Applies the override rules to a discovered path: colon-paragraph/list
    /// binding, table header/first-row binding and preceding-heading
    /// precedence within the overcut window.
    fn refine_cut(&self, mut path: CutPath, page_top: f64) -> CutPath {
        self.bind_list_to_colon_paragraph(&mut path, page_top);
        self.bind_table_header_row(&mut path, page_top);
        self.prefer_preceding_headings(&mut path, page_top);
        path
    }

    fn bind_list_to_colon_paragraph(&self, path: &mut CutPath, page_top: f64) {
        let Some(last) = path.last() else { return };
        let tag = dom::tag_name(&last.node);
        if !matches!(tag.as_deref(), Some("ul") | Some("ol")) {
            return;
        }
        let Some(previous) = dom::previous_content_sibling(&last.node) else {
            return;
        };
        if dom::tag_name(&previous).as_deref() != Some("p") {
            return;
        }
        if !previous.text_contents().trim_end().ends_with(':') {
            return;
        }
        let metrics = self.layout.measure(&previous);
        if metrics.top <= page_top + EPS {
            return;
        }
        let index = path.len() - 1;
        path[index] = CutSnapshot {
            node: previous,
            top: metrics.top,
            bottom: metrics.bottom,
        };
    }

    fn bind_table_header_row(&self, path: &mut CutPath, page_top: f64) {
        let Some(last) = path.last() else { return };
        if dom::tag_name(&last.node).as_deref() != Some("tr") {
            return;
        }
        let row = last.node.clone();
        let is_first_row = row
            .parent()
            .map(|body| {
                body.children()
                    .find(|child| child.as_element().is_some())
                    .map(|first| first == row)
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if !is_first_row {
            return;
        }
        let Some(table_index) = path
            .iter()
            .rposition(|snapshot| dom::tag_name(&snapshot.node).as_deref() == Some("table"))
        else {
            return;
        };
        if table_header(&path[table_index].node).is_none() {
            return;
        }
        if path[table_index].top > page_top + EPS {
            // Keep the first body row with its header: break before the table.
            path.truncate(table_index + 1);
            return;
        }
        // The table already opens this page, so the header and first row stay
        // put and overflow if need be. Cut at the next row instead, or give
        // up on cutting inside the table at all.
        let next_row = row
            .following_siblings()
            .find(|sibling| sibling.as_element().is_some());
        match next_row {
            Some(next) => {
                let metrics = self.layout.measure(&next);
                let index = path.len() - 1;
                path[index] = CutSnapshot {
                    node: next,
                    top: metrics.top,
                    bottom: metrics.bottom,
                };
            }
            None => path.clear(),
        }
    }

    fn prefer_preceding_headings(&self, path: &mut CutPath, page_top: f64) {
        let Some(last) = path.last() else { return };
        let candidate_top = last.top;
        let mut cursor = last.node.clone();
        let mut max_rank = u32::MAX;
        let mut chosen: Option<CutSnapshot> = None;

        while let Some(previous) = dom::previous_content_sibling(&cursor) {
            let Some(rank) = dom::tag_name(&previous).as_deref().and_then(dom::heading_rank)
            else {
                break;
            };
            if rank > max_rank {
                break;
            }
            let metrics = self.layout.measure(&previous);
            if metrics.top <= page_top + EPS
                || candidate_top - metrics.top > self.config.max_overcut + EPS
            {
                break;
            }
            chosen = Some(CutSnapshot {
                node: previous.clone(),
                top: metrics.top,
                bottom: metrics.bottom,
            });
            max_rank = rank;
            cursor = previous;
        }

        if let Some(snapshot) = chosen {
            let index = path.len() - 1;
            path[index] = snapshot;
        }
    }

    /// Top offset introduced on the next page by re-opened structure:
    /// non-suppressed margin-tops along the path plus cloned table headers.
    fn carried_overhead(&self, path: &CutPath) -> f64 {
        let mut overhead = 0.0;
        for (index, snapshot) in path.iter().enumerate() {
            let Some(tag) = dom::tag_name(&snapshot.node) else {
                continue;
            };
            if self.config.keep_margin_top_tags.contains(&tag) {
                overhead += self.layout.margin_top(&snapshot.node);
            }
            let is_ancestor = index + 1 < path.len();
            if is_ancestor && tag == "table" {
                if let Some(head) = table_header(&snapshot.node) {
                    let metrics = self.layout.measure(&head);
                    overhead += metrics.bottom - metrics.top;
                }
            }
        }
        overhead
    }
}

fn table_header(table: &NodeRef) -> Option<NodeRef> {
    table
        .children()
        .find(|child| dom::tag_name(child).as_deref() == Some("thead"))
}

fn describe_path(path: &CutPath) -> String {
    let mut out = String::new();
    for (index, snapshot) in path.iter().enumerate() {
        if index > 0 {
            out.push_str(" > ");
        }
        out.push_str(dom::tag_name(&snapshot.node).as_deref().unwrap_or("?"));
    }
    if let Some(last) = path.last() {
        out.push_str(&format!(" (top {:.1}px, bottom {:.1}px)", last.top, last.bottom));
    }
    out
}

/// Materializes pages for one container, last page first, so moves never
/// touch an already finalized page.
fn materialize(run: &ContainerRun, cuts: &[CutPath]) -> Vec<NodeRef> {
    let holder = dom::make_element("div");
    for node in &run.nodes {
        node.detach();
        holder.append(node.clone());
    }

    let mut pages_reversed: Vec<NodeRef> = Vec::new();
    for path in cuts.iter().rev() {
        pages_reversed.push(wrap_page(split_off(path)));
    }

    let remaining: Vec<NodeRef> = holder.children().collect();
    for node in &remaining {
        node.detach();
    }
    let mut pages = vec![wrap_page(remaining)];
    pages.extend(pages_reversed.into_iter().rev());
    pages
}

/// Detaches everything from the cut point onward, re-opening each split
/// ancestor as an emptied clone (with its table header re-cloned) on the new
/// page side. Returns the new page's top-level nodes in order.
fn split_off(path: &CutPath) -> Vec<NodeRef> {
    let innermost = &path[path.len() - 1].node;
    let mut carried: Vec<NodeRef> = vec![innermost.clone()];
    carried.extend(innermost.following_siblings());
    for node in &carried {
        node.detach();
    }

    for snapshot in path[..path.len() - 1].iter().rev() {
        let ancestor = &snapshot.node;
        let reopened = dom::shallow_clone(ancestor);
        if dom::tag_name(ancestor).as_deref() == Some("table") {
            if let Some(head) = table_header(ancestor) {
                reopened.append(dom::deep_clone(&head));
            }
        }
        for node in carried.drain(..) {
            reopened.append(node);
        }
        let mut next = vec![reopened];
        next.extend(ancestor.following_siblings());
        for node in &next[1..] {
            node.detach();
        }
        carried = next;
    }

    carried
}

fn wrap_page(nodes: Vec<NodeRef>) -> NodeRef {
    let wrapper = dom::make_element("div");
    for node in nodes {
        wrapper.append(node);
    }
    wrapper
}
