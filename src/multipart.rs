//! `multipart/form-data` parsing for file uploads.
//!
//! The body is read in full and handed to [`multer`]; the whole form is
//! capped at [`MAX_FORM_SIZE`]. Parts carrying a `filename` become
//! [`UploadedFile`]s, every other part is kept as a text value.

use bytes::Bytes;

use crate::error::Error;

/// Upper bound on the size of a whole multipart body: 10 MiB.
pub const MAX_FORM_SIZE: u64 = 10 << 20;

/// One uploaded file.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub field_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The text after the last `.` of the filename.
    pub fn extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// A parsed `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    values: Vec<(String, String)>,
    files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub(crate) async fn parse(content_type: &str, body: Bytes) -> Result<Self, Error> {
        let boundary = multer::parse_boundary(content_type)?;
        let constraints = multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(MAX_FORM_SIZE));
        let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match field.file_name().map(str::to_owned) {
                Some(filename) => {
                    let content_type = field.content_type().map(|mime| mime.to_string());
                    let data = field.bytes().await?;
                    form.files.push(UploadedFile { field_name: name, filename, content_type, data });
                }
                None => {
                    let value = field.text().await?;
                    form.values.push((name, value));
                }
            }
        }
        Ok(form)
    }

    /// First text value submitted under `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field)
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = concat!(
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
        "quarterly report\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"upload\"; filename=\"q3.csv\"\r\n",
        "Content-Type: text/csv\r\n\r\n",
        "a,b\n1,2\r\n",
        "--XyZ--\r\n",
    );

    #[tokio::test]
    async fn splits_files_from_text_values() {
        let form = MultipartForm::parse("multipart/form-data; boundary=XyZ", Bytes::from_static(BODY.as_bytes()))
            .await
            .unwrap();

        assert_eq!(form.value("title"), Some("quarterly report"));
        let file = form.file("upload").unwrap();
        assert_eq!(file.filename, "q3.csv");
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(&file.data[..], b"a,b\n1,2");
        assert_eq!(file.extension(), Some("csv"));
        assert_eq!(file.size(), 7);
        assert!(form.file("title").is_none());
        assert_eq!(form.files().len(), 1);
    }

    #[tokio::test]
    async fn non_multipart_content_type_is_rejected() {
        let err = MultipartForm::parse("application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Multipart(_)));
    }
}
