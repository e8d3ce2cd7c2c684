use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize};

use super::{Deployment, Kind, Namespace, Pod, ReplicaSet, Resource, ResourceList};
use crate::Result;

const DOCUMENT_SEPARATOR: &[u8] = b"\n---";

/// Splits a YAML stream on separator lines: `---` at the start of a line, optionally followed by
/// blanks, a `#` comment and a carriage return. A `---` followed by anything else stays part of the
/// current document.
struct Documents<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Documents<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { rest: Some(data) }
    }
}

impl<'a> Iterator for Documents<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.rest?;
        let mut offset = 0;
        while let Some(position) = find(&data[offset..], DOCUMENT_SEPARATOR) {
            let start = offset + position;
            let end = start + DOCUMENT_SEPARATOR.len();
            match separator_line_len(&data[end..]) {
                Some(len) => {
                    let next = end + len;
                    self.rest = (next < data.len()).then(|| &data[next..]);
                    return Some(&data[..start]);
                }
                None => offset = end,
            }
        }
        self.rest = None;
        Some(data)
    }
}

/// Given what follows a `---` at the start of a line, returns the length of the remainder of that
/// line including its newline, or `None` when the line is not a separator.
fn separator_line_len(rest: &[u8]) -> Option<usize> {
    let (line, len) = match rest.iter().position(|byte| *byte == b'\n') {
        Some(newline) => (&rest[..newline], newline + 1),
        None => (rest, rest.len()),
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = match line.iter().position(|byte| *byte == b'#') {
        Some(comment) => &line[..comment],
        None => line,
    };
    line.iter()
        .all(|byte| matches!(byte, b' ' | b'\t'))
        .then_some(len)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeaderMetadata {
    #[allow(dead_code)]
    name: String,
}

/// The minimal shape of any resource, used to decide how the rest of the document is decoded.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Header {
    kind: String,
    #[allow(dead_code)]
    metadata: HeaderMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListHeader {
    items: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

fn decode_items<T>(document: &[u8], resources: &mut Vec<Resource>) -> Result<()>
where
    T: DeserializeOwned + Into<Resource>,
{
    let list: List<T> = serde_yaml::from_slice(document)?;
    resources.extend(list.items.into_iter().map(Into::into));
    Ok(())
}

fn decode_one<T>(document: &[u8], resources: &mut Vec<Resource>) -> Result<()>
where
    T: DeserializeOwned + Into<Resource>,
{
    resources.push(serde_yaml::from_slice::<T>(document)?.into());
    Ok(())
}

/// Whether the document holds nothing but whitespace and comments.
fn is_blank(document: &[u8]) -> bool {
    document.split(|byte| *byte == b'\n').all(|line| {
        match line.iter().position(|byte| !byte.is_ascii_whitespace()) {
            None => true,
            Some(start) => line[start] == b'#',
        }
    })
}

fn decode_document(document: &[u8], resources: &mut Vec<Resource>) -> Result<()> {
    if is_blank(document) {
        return Ok(());
    }

    let Some(header) = serde_yaml::from_slice::<Option<Header>>(document)? else {
        return Ok(());
    };

    match Kind::parse(&header.kind) {
        Some(Kind::List) => {
            let list: ListHeader = serde_yaml::from_slice(document)?;
            let item_kind = list
                .items
                .first()
                .and_then(|item| Kind::parse(&item.kind));
            match item_kind {
                Some(Kind::Pod) => decode_items::<Pod>(document, resources),
                Some(Kind::Deployment) => decode_items::<Deployment>(document, resources),
                Some(Kind::ReplicaSet) => decode_items::<ReplicaSet>(document, resources),
                Some(Kind::Namespace) => decode_items::<Namespace>(document, resources),
                Some(Kind::List) | None => Ok(()),
            }
        }
        Some(Kind::Deployment) => decode_one::<Deployment>(document, resources),
        Some(Kind::ReplicaSet) => decode_one::<ReplicaSet>(document, resources),
        Some(Kind::Namespace) => decode_one::<Namespace>(document, resources),
        Some(Kind::Pod) => decode_one::<Pod>(document, resources),
        None => Ok(()),
    }
}

/// Decodes every resource of a multi-document YAML stream as produced by `kubectl get -o yaml` or
/// found in a manifest file. Items of `List` documents are unwrapped, unknown kinds are skipped.
/// Any malformed document fails the whole call.
pub fn decode(data: &[u8]) -> Result<ResourceList> {
    let mut resources = Vec::new();
    for document in Documents::new(data) {
        decode_document(document, &mut resources)?;
    }
    Ok(ResourceList(resources))
}

pub fn decode_file(path: &Path) -> Result<ResourceList> {
    decode(&std::fs::read(path)?)
}
