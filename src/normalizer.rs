//! Server vocabulary to display vocabulary, and back.
//!
//! Each table is a fixed list of `(canonical, display)` pairs. Names missing
//! from a table pass through unchanged in both directions.

pub struct NameTable {
    pairs: &'static [(&'static str, &'static str)],
}

impl NameTable {
    pub const fn new(pairs: &'static [(&'static str, &'static str)]) -> Self {
        NameTable { pairs }
    }

    pub fn to_display<'a>(&self, canonical: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(c, _)| *c == canonical)
            .map_or(canonical, |(_, d)| *d)
    }

    pub fn to_canonical<'a>(&self, display: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(_, d)| *d == display)
            .map_or(display, |(c, _)| *c)
    }

    #[cfg(test)]
    pub fn canonical_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pairs.iter().map(|(c, _)| *c)
    }
}

pub static STATUS_NAMES: NameTable = NameTable::new(&[
    ("To Do", "დასაწყები"),
    ("In Progress", "პროგრესში"),
    ("Ready for Testing", "მზად ტესტირებისთვის"),
    ("Done", "დასრულებული"),
]);

pub static DEPARTMENT_NAMES: NameTable =
    NameTable::new(&[("Design Department", "დიზაინის დეპარტამენტი")]);

pub fn status_to_display(name: &str) -> String {
    STATUS_NAMES.to_display(name).to_string()
}

pub fn status_to_canonical(name: &str) -> String {
    STATUS_NAMES.to_canonical(name).to_string()
}

pub fn department_to_display(name: &str) -> String {
    DEPARTMENT_NAMES.to_display(name).to_string()
}

pub fn department_to_canonical(name: &str) -> String {
    DEPARTMENT_NAMES.to_canonical(name).to_string()
}
