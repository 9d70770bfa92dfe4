const WIDTH: usize = 0x10;

/// One row of a hex dump: offset, hex bytes, and printable text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row<'a> {
    offset: usize,
    data: &'a [u8],
}

pub fn printable(chr: u8) -> Option<char> {
    if (0x20..0x7f).contains(&chr) {
        Some(chr as char)
    } else {
        None
    }
}

impl<'a> std::fmt::Display for Row<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04x}", self.offset)?;

        for i in 0..WIDTH {
            if i % 8 == 0 {
                write!(f, " ")?;
            }
            match self.data.get(i) {
                Some(b) => write!(f, " {:02x}", b)?,
                None => write!(f, "   ")?,
            }
        }

        write!(f, "  |")?;
        for b in self.data {
            write!(f, "{}", printable(*b).unwrap_or('.'))?;
        }
        write!(f, "|")
    }
}

pub fn rows(data: &[u8]) -> impl Iterator<Item = Row<'_>> {
    data.chunks(WIDTH)
        .enumerate()
        .map(|(i, data)| Row {
            offset: i * WIDTH,
            data,
        })
}

pub fn ehexdump_prefix(prefix: &str, data: &[u8]) {
    for row in rows(data) {
        eprintln!("{}{}", prefix, row);
    }
}

pub fn hexdump_format(data: &[u8]) -> String {
    let mut out = String::new();
    for row in rows(data) {
        out += &format!("{}\n", row);
    }
    out
}
