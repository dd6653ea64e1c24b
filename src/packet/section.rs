//! Typestates for the four sections of a DNS message.
//!
//! Decoders and encoders carry one of these as a type parameter, so records can only be read
//! or written in wire order.

mod sealed {
    pub trait Sealed: 'static {}
}

/// Implemented by the section marker types.
pub trait Section: sealed::Sealed {
    /// Position of the section in the message, and of its count in the header.
    const INDEX: usize;
    /// Name used in log and error output.
    const NAME: &'static str;
}

/// A section that has another one after it.
pub trait Followed: Section {
    type Next: Section;
}

/// A section made of resource records, which is every section but the first.
pub trait RecordSection: Section {}

/// The *Question* section.
pub enum Question {}

/// The *Answer* section.
pub enum Answer {}

/// The *Authority* section.
pub enum Authority {}

/// The *Additional Records* section.
pub enum Additional {}

macro_rules! sections {
    ( $( $ty:ident = $index:literal, $name:literal; )+ ) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Section for $ty {
                const INDEX: usize = $index;
                const NAME: &'static str = $name;
            }
        )+
    };
}

sections! {
    Question = 0, "question";
    Answer = 1, "answer";
    Authority = 2, "authority";
    Additional = 3, "additional";
}

impl Followed for Question {
    type Next = Answer;
}

impl Followed for Answer {
    type Next = Authority;
}

impl Followed for Authority {
    type Next = Additional;
}

impl RecordSection for Answer {}
impl RecordSection for Authority {}
impl RecordSection for Additional {}
