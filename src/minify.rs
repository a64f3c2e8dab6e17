//! Minifiers for combined scripts and stylesheets.
//!
//! Uses oxc for JavaScript and lightningcss for CSS.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier as OxcMinifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use thiserror::Error;

use crate::filter::FilterInfo;
use crate::set::ResourceType;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{minifier}: {message}")]
pub struct MinifyError {
    pub minifier: &'static str,
    pub message: String,
}

/// Reduces the size of the combined content of a set.
///
/// Two minifiers with equal [`FilterInfo`] must produce equal output.
pub trait Minifier: Send + Sync {
    fn info(&self) -> FilterInfo;

    fn can_apply_to(&self, _ty: ResourceType) -> bool {
        true
    }

    fn minify(&self, content: &str) -> Result<String, MinifyError>;
}

/// Passes content through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMinifier;

impl Minifier for NullMinifier {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("identity")
    }

    fn minify(&self, content: &str) -> Result<String, MinifyError> {
        Ok(content.to_string())
    }
}

// ============================================================================
// JavaScript
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct JsMinifier {
    pub mangle: bool,
    pub compress: bool,
}

impl Default for JsMinifier {
    fn default() -> Self {
        Self {
            mangle: true,
            compress: true,
        }
    }
}

impl Minifier for JsMinifier {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("js")
            .param("mangle", self.mangle)
            .param("compress", self.compress)
    }

    fn can_apply_to(&self, ty: ResourceType) -> bool {
        ty == ResourceType::Script
    }

    fn minify(&self, content: &str) -> Result<String, MinifyError> {
        let allocator = Allocator::default();
        // Classic scripts: top-level bindings stay global.
        let source_type = SourceType::cjs();
        let ret = Parser::new(&allocator, content, source_type).parse();
        if let Some(error) = ret.errors.first() {
            return Err(MinifyError {
                minifier: "js",
                message: error.to_string(),
            });
        }
        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: self.compress.then(CompressOptions::smallest),
        };
        let ret = OxcMinifier::new(options).minify(&allocator, &mut program);
        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program)
            .code;
        Ok(code)
    }
}

// ============================================================================
// CSS
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifier;

impl Minifier for CssMinifier {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("css")
    }

    fn can_apply_to(&self, ty: ResourceType) -> bool {
        ty == ResourceType::Stylesheet
    }

    fn minify(&self, content: &str) -> Result<String, MinifyError> {
        let fail = |message: String| MinifyError {
            minifier: "css",
            message,
        };
        let mut stylesheet = StyleSheet::parse(content, ParserOptions::default())
            .map_err(|e| fail(e.to_string()))?;
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| fail(e.to_string()))?;
        let result = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| fail(e.to_string()))?;
        Ok(result.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_minifier_is_identity() {
        let input = "var a = 1;\n\n// keep\n";
        assert_eq!(NullMinifier.minify(input).unwrap(), input);
    }

    #[test]
    fn test_js_minifier_shrinks() {
        let input = "function add(first, second) {\n  // sum\n  return first + second;\n}\nwindow.add = add;\n";
        let out = JsMinifier::default().minify(input).unwrap();
        assert!(out.len() < input.len());
        assert!(!out.contains("// sum"));
        assert!(out.contains("window.add"));
    }

    #[test]
    fn test_js_minifier_reports_syntax_error() {
        let err = JsMinifier::default().minify("function (").unwrap_err();
        assert_eq!(err.minifier, "js");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_css_minifier() {
        let out = CssMinifier
            .minify("body {\n  color: #ff0000;\n  margin: 0px;\n}\n")
            .unwrap();
        assert_eq!(out, "body{color:red;margin:0}");
    }

    #[test]
    fn test_minifier_identity_includes_params() {
        let a = JsMinifier::default().info();
        let b = JsMinifier {
            mangle: false,
            compress: true,
        }
        .info();
        assert_ne!(a, b);
        assert_eq!(a, JsMinifier::default().info());
        assert_ne!(NullMinifier.info(), CssMinifier.info());
    }

    #[test]
    fn test_minifier_applicability() {
        assert!(JsMinifier::default().can_apply_to(ResourceType::Script));
        assert!(!JsMinifier::default().can_apply_to(ResourceType::Stylesheet));
        assert!(CssMinifier.can_apply_to(ResourceType::Stylesheet));
        assert!(NullMinifier.can_apply_to(ResourceType::Script));
    }
}
