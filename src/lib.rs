mod assemble;
mod buffer;
mod cutter;
mod dom;
mod error;
mod pipeline;
mod template;
mod units;

pub use assemble::{OutlineEntry, assemble};
pub use buffer::{DEFAULT_INITIAL_CAPACITY, GrowBuffer};
pub use cutter::{
    BoxMetrics, ContainerPages, CutterConfig, Layout, PAGE_FOOTER_TAG, PAGE_HEADER_TAG,
    PageDescriptor, Pagination, paginate,
};
pub use dom::{deep_clone, leaf_text, make_element, tag_name};
pub use error::PageBindError;
pub use pipeline::{PageRenderer, build_document, collect_outline};
pub use template::render;
pub use units::{
    MarginBox, Orientation, PX_PER_CM, PX_PER_IN, PX_PER_MM, PX_PER_PC, PX_PER_PT, PaperFormat,
    PaperSpec, parse_length,
};
