use crate::assemble::{self, OutlineEntry};
use crate::cutter::{self, CutterConfig, Layout, PageDescriptor};
use crate::dom;
use crate::error::PageBindError;
use crate::units::PaperSpec;
use kuchiki::NodeRef;
use log::debug;

/// Renders a run of same-paper pages to a PDF byte stream.
pub trait PageRenderer {
    fn render(
        &mut self,
        pages: &[PageDescriptor],
        paper: &PaperSpec,
    ) -> Result<Vec<u8>, PageBindError>;
}

/// Full pass from a content tree to a finished PDF: paginate, render each
/// same-paper run, then merge the streams with an outline derived from the
/// headings of the paginated content.
pub fn build_document(
    root: &NodeRef,
    layout: &dyn Layout,
    config: &CutterConfig,
    renderer: &mut dyn PageRenderer,
) -> Result<Vec<u8>, PageBindError> {
    let pagination = cutter::paginate(root, layout, config)?;
    if pagination.pages.is_empty() {
        return Err(PageBindError::EmptyDocument);
    }
    let outline = collect_outline(&pagination.pages);

    let mut streams = Vec::new();
    let mut start = 0;
    while start < pagination.pages.len() {
        let paper = pagination.pages[start].paper;
        let mut end = start + 1;
        while end < pagination.pages.len() && pagination.pages[end].paper == paper {
            end += 1;
        }
        debug!(
            "rendering run of {} page(s) starting at page {}",
            end - start,
            pagination.pages[start].number
        );
        streams.push(renderer.render(&pagination.pages[start..end], &paper)?);
        start = end;
    }
    assemble::assemble(streams, &outline)
}

/// Derives bookmark entries from `h1`..`h6` elements, one per heading, in
/// page order. The heading rank doubles as the nesting level.
pub fn collect_outline(pages: &[PageDescriptor]) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    for (page_index, page) in pages.iter().enumerate() {
        for node in page.content.inclusive_descendants() {
            let Some(rank) = dom::tag_name(&node).as_deref().and_then(dom::heading_rank) else {
                continue;
            };
            let title = node.text_contents().trim().to_string();
            if title.is_empty() {
                continue;
            }
            entries.push(OutlineEntry {
                title,
                level: rank,
                page_index,
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutter::BoxMetrics;
    use crate::units::{MarginBox, PaperFormat};
    use kuchiki::traits::TendrilSink;
    use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

    struct AttrLayout;

    impl Layout for AttrLayout {
        fn measure(&self, node: &NodeRef) -> BoxMetrics {
            let read = |name: &str| {
                dom::attribute(node, name)
                    .and_then(|value| value.parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            BoxMetrics {
                top: read("data-top"),
                bottom: read("data-bottom"),
            }
        }
    }

    fn body_of(html: &str) -> NodeRef {
        kuchiki::parse_html()
            .one(html)
            .select_first("body")
            .unwrap()
            .as_node()
            .clone()
    }

    fn blank_pdf(page_count: usize) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<LoObject> = Vec::new();
        for _ in 0..page_count {
            let content_id = doc.add_object(LoStream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save fixture");
        bytes
    }

    struct StubRenderer {
        calls: Vec<usize>,
    }

    impl PageRenderer for StubRenderer {
        fn render(
            &mut self,
            pages: &[PageDescriptor],
            _paper: &PaperSpec,
        ) -> Result<Vec<u8>, PageBindError> {
            self.calls.push(pages.len());
            Ok(blank_pdf(pages.len()))
        }
    }

    fn test_config() -> CutterConfig {
        CutterConfig {
            paper: PaperFormat::Custom {
                width: 100.0,
                height: 120.0,
            },
            margin: MarginBox::uniform(10.0),
            ..CutterConfig::default()
        }
    }

    #[test]
    fn one_run_per_paper_change() {
        let body = body_of(concat!(
            r#"<p data-top="0" data-bottom="60">alpha</p>"#,
            r#"<p data-top="60" data-bottom="150">beta</p>"#,
            r#"<page-header paper="100px 120px" margin="10px" orientation="landscape">"#,
            r#"</page-header>"#,
            r#"<p data-top="0" data-bottom="50">gamma</p>"#,
        ));
        let mut renderer = StubRenderer { calls: Vec::new() };
        let out = build_document(&body, &AttrLayout, &test_config(), &mut renderer).unwrap();
        assert_eq!(renderer.calls, vec![2, 1]);
        let doc = LoDocument::load_mem(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn headings_become_outline_entries() {
        let body = body_of(concat!(
            r#"<h3 data-top="0" data-bottom="20">Intro</h3>"#,
            r#"<p data-top="20" data-bottom="90">alpha</p>"#,
            r#"<p data-top="90" data-bottom="150">beta</p>"#,
            r#"<page-header paper="100px 120px" margin="10px" orientation="landscape">"#,
            r#"</page-header>"#,
            r#"<h3 data-top="0" data-bottom="20">Annex</h3>"#,
        ));
        let mut renderer = StubRenderer { calls: Vec::new() };
        let out = build_document(&body, &AttrLayout, &test_config(), &mut renderer).unwrap();
        let doc = LoDocument::load_mem(&out).unwrap();
        let catalog = doc.catalog().unwrap();
        assert!(catalog.get(b"Outlines").is_ok());

        let pagination = cutter::paginate(
            &body_of(concat!(
                r#"<h3 data-top="0" data-bottom="20">Intro</h3>"#,
                r#"<p data-top="20" data-bottom="90">alpha</p>"#,
            )),
            &AttrLayout,
            &test_config(),
        )
        .unwrap();
        let outline = collect_outline(&pagination.pages);
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].title, "Intro");
        assert_eq!(outline[0].level, 3);
        assert_eq!(outline[0].page_index, 0);
    }

    #[test]
    fn empty_tree_is_rejected() {
        let body = body_of("");
        let mut renderer = StubRenderer { calls: Vec::new() };
        let err = build_document(&body, &AttrLayout, &test_config(), &mut renderer).unwrap_err();
        assert!(matches!(err, PageBindError::EmptyDocument));
    }
}
