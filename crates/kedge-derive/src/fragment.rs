use convert_case::{Case, Casing};
use darling::{FromDeriveInput, FromField, FromMeta, ast::Data, util::Ignored};
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{Attribute, DeriveInput, Generics, LitStr, Path, Type, parse_quote};

#[derive(FromMeta)]
struct PathOverrides {
    #[darling(default = "PathOverrides::default_schema")]
    schema: Path,
    #[darling(default = "PathOverrides::default_result")]
    result: Path,
}
impl std::default::Default for PathOverrides {
    fn default() -> Self {
        Self {
            schema: Self::default_schema(),
            result: Self::default_result(),
        }
    }
}
impl PathOverrides {
    fn default_schema() -> Path {
        parse_quote!(::kedge::schema)
    }

    fn default_result() -> Path {
        parse_quote!(::core::result)
    }
}

#[derive(FromDeriveInput)]
#[darling(
    attributes(schema),
    forward_attrs(serde),
    supports(struct_named)
)]
struct SchemaInput {
    ident: Ident,
    generics: Generics,
    data: Data<Ignored, SchemaField>,
    attrs: Vec<Attribute>,
    #[darling(default)]
    path_overrides: PathOverrides,
}

#[derive(FromField)]
#[darling(attributes(schema), forward_attrs(serde))]
struct SchemaField {
    ident: Option<Ident>,
    ty: Type,
    attrs: Vec<Attribute>,
    #[darling(default)]
    overrides: bool,
}

/// The subset of serde's field attributes that decide under which key a field is read.
#[derive(Default)]
struct SerdeField {
    rename: Option<String>,
    flatten: bool,
    skip: bool,
}

/// Rename rules as spelled in `#[serde(rename_all = "...")]`.
enum RenameRule {
    Verbatim,
    Lower,
    Camel,
    Pascal,
    Snake,
    Kebab,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "lowercase" => Ok(Self::Lower),
            "camelCase" => Ok(Self::Camel),
            "PascalCase" => Ok(Self::Pascal),
            "snake_case" => Ok(Self::Snake),
            "kebab-case" => Ok(Self::Kebab),
            other => Err(syn::Error::new(
                lit.span(),
                format!("unsupported rename rule {other:?} for SchemaFragment"),
            )),
        }
    }

    fn apply(&self, field: &str) -> String {
        match self {
            Self::Verbatim => field.to_owned(),
            Self::Lower => field.to_lowercase(),
            Self::Camel => field.to_case(Case::Camel),
            Self::Pascal => field.to_case(Case::Pascal),
            Self::Snake => field.to_case(Case::Snake),
            Self::Kebab => field.to_case(Case::Kebab),
        }
    }
}

/// Skips the value of a serde attribute entry that is irrelevant for key names,
/// such as `default = "..."` or `skip_serializing_if = "..."`.
fn skip_entry(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_entry(&nested))?;
    }
    Ok(())
}

fn container_rename_rule(attrs: &[Attribute]) -> syn::Result<RenameRule> {
    let mut rule = RenameRule::Verbatim;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let lit: LitStr = meta.value()?.parse()?;
                rule = RenameRule::parse(&lit)?;
                Ok(())
            } else {
                skip_entry(&meta)
            }
        })?;
    }
    Ok(rule)
}

fn serde_field(attrs: &[Attribute]) -> syn::Result<SerdeField> {
    let mut field = SerdeField::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                field.rename = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("flatten") {
                field.flatten = true;
                Ok(())
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                field.skip = true;
                Ok(())
            } else {
                skip_entry(&meta)
            }
        })?;
    }
    Ok(field)
}

pub fn derive(input: DeriveInput) -> TokenStream {
    let SchemaInput {
        ident,
        generics,
        data,
        attrs,
        path_overrides:
            PathOverrides {
                schema: schema_mod,
                result: result_mod,
            },
    } = match SchemaInput::from_derive_input(&input) {
        Ok(input) => input,
        Err(err) => return err.write_errors(),
    };

    let rename_rule = match container_rename_rule(&attrs) {
        Ok(rule) => rule,
        Err(err) => return err.to_compile_error(),
    };

    // `supports(struct_named)` already rejected every other shape with a darling error.
    let fields = data
        .take_struct()
        .map(|fields| fields.fields)
        .unwrap_or_default();

    let mut statements = Vec::new();
    for SchemaField {
        ident: field_ident,
        ty,
        attrs,
        overrides,
    } in fields
    {
        let serde = match serde_field(&attrs) {
            Ok(serde) => serde,
            Err(err) => return err.to_compile_error(),
        };
        if serde.skip {
            continue;
        }
        if serde.flatten {
            if overrides {
                return quote! {
                    compile_error!("`#[schema(overrides)]` cannot be combined with `#[serde(flatten)]`");
                };
            }
            statements.push(quote! {
                fragment.push_embedded(<#ty as #schema_mod::SchemaFragment>::fragment()?);
            });
            continue;
        }

        let key = match (serde.rename, field_ident) {
            (Some(rename), _) => rename,
            (None, Some(field_ident)) => {
                let name = field_ident.to_string();
                rename_rule.apply(name.strip_prefix("r#").unwrap_or(&name))
            }
            (None, None) => continue,
        };
        statements.push(quote! {
            fragment.push_field(#schema_mod::FieldKey::new(#key, #overrides));
        });
    }

    let name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    quote! {
        impl #impl_generics #schema_mod::SchemaFragment for #ident #ty_generics #where_clause {
            fn fragment() -> #result_mod::Result<#schema_mod::Fragment, #schema_mod::Error> {
                let mut fragment = #schema_mod::Fragment::new(#name);
                #(#statements)*
                #result_mod::Result::Ok(fragment)
            }
        }
    }
}
