use std::fmt;

#[derive(Debug)]
pub enum PageBindError {
    InvalidLength(String),
    InvalidPaper(String),
    InvalidMargin(String),
    InvalidOrientation(String),
    PaginationLoopDetected(String),
    EmptyDocument,
    InvalidPageStream(String),
    MissingOutlineTarget { title: String, page_index: usize },
    Render(String),
    Pdf(lopdf::Error),
    Io(std::io::Error),
}

impl fmt::Display for PageBindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageBindError::InvalidLength(token) => write!(f, "invalid length: {}", token),
            PageBindError::InvalidPaper(token) => write!(f, "invalid paper: {}", token),
            PageBindError::InvalidMargin(token) => write!(f, "invalid margin: {}", token),
            PageBindError::InvalidOrientation(token) => {
                write!(f, "invalid orientation: {}", token)
            }
            PageBindError::PaginationLoopDetected(path) => {
                write!(
                    f,
                    "pagination loop detected: carried overhead consumes a full page at {}",
                    path
                )
            }
            PageBindError::EmptyDocument => write!(f, "no page streams provided to assemble"),
            PageBindError::InvalidPageStream(message) => {
                write!(f, "invalid page stream: {}", message)
            }
            PageBindError::MissingOutlineTarget { title, page_index } => {
                write!(
                    f,
                    "outline entry {:?} targets missing page index {}",
                    title, page_index
                )
            }
            PageBindError::Render(message) => write!(f, "render error: {}", message),
            PageBindError::Pdf(err) => write!(f, "pdf error: {}", err),
            PageBindError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PageBindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageBindError::Pdf(err) => Some(err),
            PageBindError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<lopdf::Error> for PageBindError {
    fn from(value: lopdf::Error) -> Self {
        PageBindError::Pdf(value)
    }
}

impl From<std::io::Error> for PageBindError {
    fn from(value: std::io::Error) -> Self {
        PageBindError::Io(value)
    }
}
