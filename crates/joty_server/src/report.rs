//! Report rendering seam.
//!
//! The server does not render reports itself. A [`ReportEngine`] receives
//! the report name, the `<ReportParms>` items bound into a parameter context
//! and a connection, and returns the rendered document.

use crate::db::Connection;
use joty_protocol::ParamContext;

/// Renders named reports.
pub trait ReportEngine: Send + Sync {
    /// Renders `name`.
    fn render(
        &self,
        name: &str,
        params: &ParamContext,
        conn: &mut dyn Connection,
    ) -> Result<Vec<u8>, String>;
}

impl<F> ReportEngine for F
where
    F: Fn(&str, &ParamContext, &mut dyn Connection) -> Result<Vec<u8>, String> + Send + Sync,
{
    fn render(
        &self,
        name: &str,
        params: &ParamContext,
        conn: &mut dyn Connection,
    ) -> Result<Vec<u8>, String> {
        self(name, params, conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionProvider;
    use crate::memory::MemoryProvider;

    #[test]
    fn closures_are_engines() {
        let engine = |name: &str,
                      params: &ParamContext,
                      _conn: &mut dyn Connection|
         -> Result<Vec<u8>, String> {
            Ok(format!("{name}:{}", params.get("year")).into_bytes())
        };
        let provider = MemoryProvider::new();
        let mut conn = provider.acquire().unwrap();
        let mut params = ParamContext::new();
        params.set_num("year", 2024);
        let out = ReportEngine::render(&engine, "sales", &params, conn.as_mut()).unwrap();
        assert_eq!(out, b"sales:2024");
    }
}
